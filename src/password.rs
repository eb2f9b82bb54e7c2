use anyhow::Result;
use rand::RngCore;
use tokio::task;

/// Hashes a password with a fresh random salt, off the async threads.
pub async fn hash(password: &str) -> Result<String> {
    let pwd = password.as_bytes().to_vec();
    Ok(task::spawn_blocking(move || {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        argon2::hash_encoded(&pwd, &salt, &argon2::Config::default())
    })
    .await??)
}

/// Verifies a password against a stored encoded hash.
pub async fn verify(encoded: &str, password: &str) -> Result<bool> {
    let encoded = encoded.to_string();
    let pwd = password.as_bytes().to_vec();
    Ok(task::spawn_blocking(move || argon2::verify_encoded(&encoded, &pwd)).await??)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_roundtrip() {
        let encoded = hash("hunter2").await.unwrap();
        assert!(verify(&encoded, "hunter2").await.unwrap());
        assert!(!verify(&encoded, "hunter3").await.unwrap());
    }
}
