use rand::Rng;

pub const ALPHA_NUM: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Build a random string of `len` characters picked from `charset`
///
/// Not suitable for secrets, this is only meant for things like temporary
/// file names.
pub fn pseudorandom_string(charset: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| charset[rng.random_range(0..charset.len())] as char)
        .collect()
}
