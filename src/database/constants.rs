/// Plugin name the native side registers the database operations under.
pub const DATABASE_PLUGIN_NAME: &str = "FirebaseDatabase";

/// Subscription id sent with `on` when no persistent listener is wanted.
pub(crate) const ONE_SHOT_LISTENER_ID: &str = "";

pub(crate) const OP_ON: &str = "on";
pub(crate) const OP_OFF: &str = "off";
pub(crate) const OP_SET: &str = "set";
pub(crate) const OP_PUSH: &str = "push";
pub(crate) const OP_UPDATE: &str = "update";
pub(crate) const OP_SET_ONLINE: &str = "setOnline";
