use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::Digest;
use sha2::Sha256;

const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 32;

/// PKCE verifier/challenge pair. `code_challenge` is the S256 hash of
/// `code_verifier`, base64url-encoded without padding.
#[derive(Debug, Clone)]
pub struct PkceCodes {
    pub code_verifier: String,
    pub code_challenge: String,
}

pub fn generate_pkce() -> PkceCodes {
    let code_verifier = random_url_safe(VERIFIER_BYTES);
    let code_challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()));
    PkceCodes { code_verifier, code_challenge }
}

pub fn generate_state() -> String {
    random_url_safe(STATE_BYTES)
}

fn random_url_safe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_challenge_is_sha256_of_verifier() {
        let pkce = generate_pkce();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.code_verifier.as_bytes()));
        assert_eq!(pkce.code_challenge, expected);
    }

    #[test]
    fn state_and_verifier_are_not_repeated() {
        assert_ne!(generate_state(), generate_state());
        assert_ne!(generate_pkce().code_verifier, generate_pkce().code_verifier);
    }

    #[test]
    fn state_and_verifier_are_url_safe() {
        let state = generate_state();
        assert!(!state.contains('+') && !state.contains('/') && !state.contains('='));
    }
}
