use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey};
use rand::RngCore;

use crate::error::RooletError;

const SEGMENT_BYTES: usize = 64;
/// Inclusive ASCII range random segment bytes are drawn from (`spec.md` §4.3).
const SEGMENT_RANGE: std::ops::RangeInclusive<u8> = 48..=122;

fn url_safe_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn random_segment_bytes() -> Vec<u8> {
    let mut rng = rand::rngs::OsRng;
    let span = (*SEGMENT_RANGE.end() as u16) - (*SEGMENT_RANGE.start() as u16) + 1;
    (0..SEGMENT_BYTES)
        .map(|_| *SEGMENT_RANGE.start() + (rng.next_u32() % span as u32) as u8)
        .collect()
}

/// Produces the three-segment signed authentication token proving the
/// client holds a private key matching a public key the broker already
/// trusts (`spec.md` §4.3), grounded on the token assembly in
/// `original_source/clients/python3/libroolet/client.py`.
pub struct TokenMaker {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
}

impl TokenMaker {
    /// `algorithm_name` and `priv_key_path` come straight from
    /// [`crate::config::Configuration`]; an unsupported algorithm or an
    /// unreadable key file is a fatal startup error.
    pub fn new(algorithm_name: &str, priv_key_path: &std::path::Path) -> Result<Self, RooletError> {
        let algorithm = parse_algorithm(algorithm_name)?;
        let pem = std::fs::read(priv_key_path).map_err(|source| RooletError::KeyRead {
            path: priv_key_path.to_path_buf(),
            source,
        })?;
        let encoding_key = match algorithm {
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
                EncodingKey::from_rsa_pem(&pem).map_err(RooletError::TokenSign)?
            }
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => EncodingKey::from_secret(&pem),
            other => return Err(RooletError::UnsupportedAlgorithm(format!("{other:?}"))),
        };
        Ok(Self {
            algorithm,
            encoding_key,
        })
    }

    /// Builds a fresh `seg1.seg2.seg3` token. Each call draws new random
    /// segments, so tokens are never replayed across handshakes.
    pub fn make_token(&self) -> Result<String, RooletError> {
        let seg1 = url_safe_base64(&random_segment_bytes());
        let seg2 = url_safe_base64(&random_segment_bytes());
        let signing_input = format!("{seg1}.{seg2}");

        let header = jsonwebtoken::Header::new(self.algorithm);
        // jsonwebtoken signs header.claims internally; we only need the raw
        // signature over our own signing input, so sign it directly.
        let signature = jsonwebtoken::crypto::sign(
            signing_input.as_bytes(),
            &self.encoding_key,
            header.alg,
        )
        .map_err(RooletError::TokenSign)?;

        Ok(format!("{signing_input}.{signature}"))
    }
}

fn parse_algorithm(name: &str) -> Result<Algorithm, RooletError> {
    match name {
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(RooletError::UnsupportedAlgorithm(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkcs8::EncodePrivateKey;
    use rsa::RsaPrivateKey;

    fn write_rsa_key(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let pem = key.to_pkcs8_pem(Default::default()).unwrap();
        let path = dir.path().join("priv.pem");
        std::fs::write(&path, pem.as_bytes()).unwrap();
        path
    }

    #[test]
    fn token_has_three_segments() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rsa_key(&dir);
        let maker = TokenMaker::new("RS256", &path).unwrap();
        let token = maker.make_token().unwrap();
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);
    }

    #[test]
    fn segments_decode_to_64_bytes_in_ascii_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rsa_key(&dir);
        let maker = TokenMaker::new("RS256", &path).unwrap();
        let token = maker.make_token().unwrap();
        let segments: Vec<&str> = token.split('.').collect();

        for raw in &segments[..2] {
            let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(raw)
                .unwrap();
            assert_eq!(decoded.len(), SEGMENT_BYTES);
            assert!(decoded
                .iter()
                .all(|byte| SEGMENT_RANGE.contains(byte)));
        }
    }

    #[test]
    fn tokens_are_not_replayed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rsa_key(&dir);
        let maker = TokenMaker::new("RS256", &path).unwrap();
        assert_ne!(maker.make_token().unwrap(), maker.make_token().unwrap());
    }

    #[test]
    fn unknown_algorithm_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rsa_key(&dir);
        let err = TokenMaker::new("ES256", &path).unwrap_err();
        assert!(matches!(err, RooletError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn missing_key_file_is_fatal() {
        let err = TokenMaker::new("RS256", std::path::Path::new("/nonexistent/priv.pem"))
            .unwrap_err();
        assert!(matches!(err, RooletError::KeyRead { .. }));
    }
}
