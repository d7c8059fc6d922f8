//! Named loggers with per-instance levels.
//!
//! Records below a logger's level are dropped. Everything else goes to the
//! optional user handler and then to the `log` facade, using the logger name
//! as the record target.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, LazyLock, Mutex, RwLock, Weak};

static GLOBAL_LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INSTANCES: LazyLock<Mutex<Vec<Weak<LoggerInner>>>> =
    LazyLock::new(|| Mutex::new(Vec::new()));

type SharedLogHandler = Arc<dyn Fn(&Logger, LogLevel, &str) + Send + Sync + 'static>;

#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.inner.name)
            .field("level", &self.log_level())
            .finish()
    }
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        let inner = Arc::new(LoggerInner::new(name.into()));
        INSTANCES.lock().unwrap().push(Arc::downgrade(&inner));
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_u8(self.inner.log_level.load(Ordering::SeqCst))
    }

    pub fn set_log_level<L>(&self, level: L) -> Result<(), LogError>
    where
        L: IntoLogLevel,
    {
        let level = level.into_log_level()?;
        self.inner.log_level.store(level as u8, Ordering::SeqCst);
        Ok(())
    }

    /// Installs a handler that sees every record at or above the logger level,
    /// before it reaches the `log` facade.
    pub fn set_user_log_handler<F>(&self, handler: F)
    where
        F: Fn(&Logger, LogLevel, &str) + Send + Sync + 'static,
    {
        *self.inner.user_log_handler.write().unwrap() = Some(Arc::new(handler));
    }

    pub fn clear_user_log_handler(&self) {
        self.inner.user_log_handler.write().unwrap().take();
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Debug, message.into());
    }

    pub fn log(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Verbose, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Error, message.into());
    }

    fn dispatch(&self, level: LogLevel, message: String) {
        if level == LogLevel::Silent || level < self.log_level() {
            return;
        }
        let user_handler = self.inner.user_log_handler.read().unwrap().clone();
        if let Some(handler) = user_handler {
            handler(self, level, &message);
        }
        forward_to_facade(self, level, &message);
    }
}

struct LoggerInner {
    name: String,
    log_level: AtomicU8,
    user_log_handler: RwLock<Option<SharedLogHandler>>,
}

impl LoggerInner {
    fn new(name: String) -> Self {
        Self {
            name,
            log_level: AtomicU8::new(GLOBAL_LOG_LEVEL.load(Ordering::SeqCst)),
            user_log_handler: RwLock::new(None),
        }
    }
}

fn forward_to_facade(logger: &Logger, level: LogLevel, message: &str) {
    let target = logger.name();
    match level {
        LogLevel::Debug => log::trace!(target: target, "{message}"),
        LogLevel::Verbose => log::debug!(target: target, "{message}"),
        LogLevel::Info => log::info!(target: target, "{message}"),
        LogLevel::Warn => log::warn!(target: target, "{message}"),
        LogLevel::Error => log::error!(target: target, "{message}"),
        LogLevel::Silent => {}
    }
}

/// Sets the level of every live logger and of loggers created afterwards.
pub fn set_log_level<L>(level: L) -> Result<(), LogError>
where
    L: IntoLogLevel,
{
    let level = level.into_log_level()?;
    GLOBAL_LOG_LEVEL.store(level as u8, Ordering::SeqCst);

    let mut instances = INSTANCES.lock().unwrap();
    instances.retain(|weak| match weak.upgrade() {
        Some(inner) => {
            inner.log_level.store(level as u8, Ordering::SeqCst);
            true
        }
        None => false,
    });
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Verbose = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Silent = 5,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "verbose",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Silent => "silent",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Verbose,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            4 => LogLevel::Error,
            _ => LogLevel::Silent,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "verbose" => Ok(LogLevel::Verbose),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "silent" => Ok(LogLevel::Silent),
            other => Err(LogError::InvalidLogLevel(other.to_string())),
        }
    }
}

pub trait IntoLogLevel {
    fn into_log_level(self) -> Result<LogLevel, LogError>;
}

impl IntoLogLevel for LogLevel {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        Ok(self)
    }
}

impl IntoLogLevel for &str {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        LogLevel::from_str(self)
    }
}

impl IntoLogLevel for String {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        LogLevel::from_str(&self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    InvalidLogLevel(String),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::InvalidLogLevel(level) => write!(f, "invalid log level '{level}'"),
        }
    }
}

impl std::error::Error for LogError {}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    // tests that touch levels share the global one
    static LEVELS: Mutex<()> = Mutex::new(());

    fn capture(logger: &Logger) -> Arc<Mutex<Vec<(LogLevel, String)>>> {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = records.clone();
        logger.set_user_log_handler(move |_, level, message| {
            sink.lock().unwrap().push((level, message.to_string()));
        });
        records
    }

    #[test]
    fn records_below_level_are_dropped() {
        let _guard = LEVELS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let logger = Logger::new("@test/level");
        logger.set_log_level(LogLevel::Warn).unwrap();
        let records = capture(&logger);

        logger.debug("noise");
        logger.info("still noise");
        logger.warn("careful");
        logger.error("broken");

        assert_eq!(
            records.lock().unwrap().as_slice(),
            &[
                (LogLevel::Warn, "careful".to_string()),
                (LogLevel::Error, "broken".to_string()),
            ]
        );
    }

    #[test]
    fn cleared_handler_stops_receiving() {
        let _guard = LEVELS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let logger = Logger::new("@test/clear");
        logger.set_log_level("debug").unwrap();
        let records = capture(&logger);
        logger.debug("one");
        logger.clear_user_log_handler();
        logger.debug("two");
        assert_eq!(records.lock().unwrap().len(), 1);
    }

    #[test]
    fn global_level_reaches_live_loggers_and_prunes_dropped_ones() {
        let _guard = LEVELS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let live = Logger::new("@test/global-live");
        live.set_log_level(LogLevel::Debug).unwrap();
        let dropped = Logger::new("@test/global-dropped");
        let dropped_inner = Arc::downgrade(&dropped.inner);
        drop(dropped);

        set_log_level("error").unwrap();
        assert_eq!(live.log_level(), LogLevel::Error);
        assert_eq!(Logger::new("@test/global-later").log_level(), LogLevel::Error);
        {
            let instances = INSTANCES.lock().unwrap();
            assert!(instances
                .iter()
                .all(|weak| !Weak::ptr_eq(weak, &dropped_inner)));
        }

        let records = capture(&live);
        live.warn("hidden");
        live.error("shown");
        assert_eq!(
            records.lock().unwrap().as_slice(),
            &[(LogLevel::Error, "shown".to_string())]
        );

        assert!(set_log_level("loud").is_err());
        set_log_level(LogLevel::Info).unwrap();
        assert_eq!(live.log_level(), LogLevel::Info);
    }

    #[test]
    fn level_names_parse() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::Verbose.to_string(), "VERBOSE");
        assert_eq!(
            "loud".parse::<LogLevel>().unwrap_err(),
            LogError::InvalidLogLevel("loud".into())
        );
    }
}
