use rand::Rng;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Source of candidate short codes. Uniqueness is checked by the store, not here.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random alphanumeric codes of a fixed length.
#[derive(Debug, Clone)]
pub struct RandomCode {
    len: usize,
}

impl RandomCode {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl CodeGenerator for RandomCode {
    fn generate(&self) -> String {
        random_code(self.len)
    }
}

/// Generate a random alphanumeric string of the given length.
pub fn random_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
