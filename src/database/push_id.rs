use rand::Rng;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Mints 20-character child keys that sort in creation order: 8 characters
/// of millisecond timestamp followed by 12 random characters. Keys minted in
/// the same millisecond increment the random part instead of redrawing it.
#[derive(Debug, Default)]
pub(crate) struct PushIdGenerator {
    last_push_time: u64,
    last_rand_chars: [u8; 12],
}

impl PushIdGenerator {
    pub(crate) fn next_id(&mut self, now: u64) -> String {
        let duplicate_time = now == self.last_push_time;
        self.last_push_time = now;

        let mut remaining = now;
        let mut timestamp_chars = [0u8; 8];
        for slot in timestamp_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(remaining % 64) as usize];
            remaining /= 64;
        }
        debug_assert!(remaining == 0, "push id timestamp overflowed base64 encoding");

        if duplicate_time {
            self.increment_random_chars();
        } else {
            let mut rng = rand::thread_rng();
            for slot in self.last_rand_chars.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        }

        let mut id = String::with_capacity(20);
        id.extend(timestamp_chars.iter().map(|&ch| ch as char));
        id.extend(
            self.last_rand_chars
                .iter()
                .map(|&index| PUSH_CHARS[index as usize] as char),
        );
        id
    }

    fn increment_random_chars(&mut self) {
        for slot in self.last_rand_chars.iter_mut().rev() {
            if *slot < 63 {
                *slot += 1;
                return;
            }
            *slot = 0;
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn ids_sort_in_creation_order() {
        let mut generator = PushIdGenerator::default();
        let mut ids = Vec::new();
        for now in [1_000, 1_000, 1_000, 1_001, 5_000_000] {
            ids.push(generator.next_id(now));
        }
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(ids.iter().all(|id| id.len() == 20));
        assert_eq!(
            ids.iter().collect::<std::collections::HashSet<_>>().len(),
            ids.len()
        );
    }

    #[test]
    fn same_millisecond_increments_with_carry() {
        let mut generator = PushIdGenerator {
            last_push_time: 7,
            last_rand_chars: [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 63],
        };
        let id = generator.next_id(7);
        assert_eq!(&id[8..], "----------1-");
        assert!(&id[8..] > "----------0z");
    }
}
