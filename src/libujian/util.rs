use chrono::Utc;
use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Identifier in the form `{prefix}_{millis base36}_{6 random base36 chars}`,
/// used for user, question and result ids.
pub fn generate_id(prefix: &str) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| BASE36[rng.random_range(0..36)] as char)
        .collect();
    let millis = Utc::now().timestamp_millis().max(0) as u128;
    format!("{}_{}_{}", prefix, to_base36(millis), suffix)
}

pub fn score_to_grade(score: u32) -> char {
    match score {
        85.. => 'A',
        70.. => 'B',
        55.. => 'C',
        40.. => 'D',
        _ => 'E',
    }
}
