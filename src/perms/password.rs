use lazy_regex::regex_is_match;
use rand::Rng;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Random password made of ASCII letters
pub fn generate_password(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

/// At least 8 ASCII letters or digits
pub fn is_valid_password(password: &str) -> bool {
    regex_is_match!(r"^[a-zA-Z0-9]{8,}$", password)
}
