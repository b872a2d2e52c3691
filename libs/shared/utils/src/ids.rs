use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Opaque record key.
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Human-readable identifier such as `APT-LZ3K9Q1B-7XQ2`. Collision resistant
/// through the millisecond timestamp plus a random suffix, not globally unique.
pub fn human_readable_id(prefix: &str, at: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();

    format!("{}-{}-{}", prefix, to_base36(at.timestamp_millis().max(0) as u64), suffix)
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}
