//! Signed CDN delivery grants.
//!
//! Protected media sits behind a CDN that verifies canned-policy signatures
//! against a registered public key. This module builds the policy for a
//! resource (or resource prefix), signs it RSA-SHA1 with the distribution's
//! private key, and hands back either signed-URL query parameters or the
//! cookie triple for prefix-wide grants.
//!
//! Grants are ephemeral: computed fresh per request, never persisted, and
//! revocable only by TTL expiry or key rotation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{StorageError, StorageResult};

/// Default expiry for delivery grants (1 hour).
pub const DEFAULT_GRANT_TTL_SECS: u64 = 3600;

/// Maximum allowed expiry (7 days) to prevent long-lived grant leakage.
pub const MAX_GRANT_TTL_SECS: u64 = 604_800;

/// Delivery configuration.
#[derive(Debug, Clone, Default)]
pub struct DeliveryConfig {
    /// CDN distribution domain (e.g. "media.cinevault.io").
    pub cdn_domain: Option<String>,
    /// Public key pair ID registered with the CDN.
    pub key_pair_id: Option<String>,
    /// Path to the PEM-encoded RSA private key.
    pub private_key_path: Option<PathBuf>,
    /// Default grant TTL.
    pub default_ttl: Duration,
}

impl DeliveryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            cdn_domain: std::env::var("CDN_DOMAIN").ok(),
            key_pair_id: std::env::var("CDN_KEY_PAIR_ID").ok(),
            private_key_path: std::env::var("CDN_PRIVATE_KEY_PATH").ok().map(PathBuf::from),
            default_ttl: Duration::from_secs(
                std::env::var("DELIVERY_URL_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_GRANT_TTL_SECS)
                    .min(MAX_GRANT_TTL_SECS),
            ),
        }
    }
}

/// A signed URL grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedUrl {
    /// Full URL with `Expires`, `Signature` and `Key-Pair-Id` appended.
    pub url: String,
    /// Expiry (Unix seconds).
    pub expires_at: i64,
    /// Expiry in seconds from issuance.
    pub expires_in_secs: u64,
}

/// A signed cookie grant covering a resource prefix.
///
/// One signature authorizes every object under the prefix, e.g. all the
/// segments of an adaptive-bitrate stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieGrant {
    /// URL-safe base64 policy (`CloudFront-Policy` cookie value).
    pub policy: String,
    /// URL-safe base64 signature (`CloudFront-Signature` cookie value).
    pub signature: String,
    /// Key pair ID (`CloudFront-Key-Pair-Id` cookie value).
    pub key_pair_id: String,
    /// Expiry (Unix seconds).
    pub expires_at: i64,
}

// Canned policy shape required by the CDN. Field order is the serialization
// contract; serde_json emits struct fields in declaration order.

#[derive(Serialize)]
struct Policy<'a> {
    #[serde(rename = "Statement")]
    statement: [PolicyStatement<'a>; 1],
}

#[derive(Serialize)]
struct PolicyStatement<'a> {
    #[serde(rename = "Resource")]
    resource: &'a str,
    #[serde(rename = "Condition")]
    condition: PolicyCondition,
}

#[derive(Serialize)]
struct PolicyCondition {
    #[serde(rename = "DateLessThan")]
    date_less_than: DateLessThan,
}

#[derive(Serialize)]
struct DateLessThan {
    #[serde(rename = "AWS:EpochTime")]
    epoch_time: i64,
}

/// Serialize the canned policy for a resource and expiry.
fn canned_policy(resource: &str, expires_at: i64) -> String {
    let policy = Policy {
        statement: [PolicyStatement {
            resource,
            condition: PolicyCondition {
                date_less_than: DateLessThan {
                    epoch_time: expires_at,
                },
            },
        }],
    };

    // Infallible: the policy contains no non-string-keyed maps.
    serde_json::to_string(&policy).expect("policy serialization")
}

/// Base64 with the CDN's URL-safe character substitution.
fn url_safe_b64(bytes: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    STANDARD
        .encode(bytes)
        .replace('+', "-")
        .replace('=', "_")
        .replace('/', "~")
}

/// Signed delivery grant generator.
///
/// The private key is loaded lazily on first use and memoized for the
/// process lifetime; `invalidate_key` drops it so a rotated key is picked
/// up on the next grant. Key material is never logged.
pub struct DeliveryService {
    config: DeliveryConfig,
    key: RwLock<Option<Arc<SigningKey<Sha1>>>>,
}

impl DeliveryService {
    /// Create a new delivery service.
    pub fn new(config: DeliveryConfig) -> Self {
        if config.cdn_domain.is_none()
            || config.key_pair_id.is_none()
            || config.private_key_path.is_none()
        {
            warn!("CDN delivery is not fully configured; signed grants are disabled");
        }

        Self {
            config,
            key: RwLock::new(None),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::new(DeliveryConfig::from_env())
    }

    /// Whether signing is configured. Callers should degrade (disable
    /// delivery) when this is false rather than attempt a grant.
    pub fn is_configured(&self) -> bool {
        self.config.cdn_domain.is_some()
            && self.config.key_pair_id.is_some()
            && self.config.private_key_path.is_some()
    }

    /// Full CDN URL for a resource path.
    pub fn cdn_url(&self, path: &str) -> StorageResult<String> {
        let domain = self
            .config
            .cdn_domain
            .as_deref()
            .ok_or_else(|| StorageError::not_configured("CDN_DOMAIN not set"))?;
        Ok(format!("https://{}/{}", domain, path.trim_start_matches('/')))
    }

    /// Drop the memoized private key so a rotated key is reloaded on the
    /// next grant.
    pub async fn invalidate_key(&self) {
        let mut guard = self.key.write().await;
        if guard.take().is_some() {
            info!("Delivery signing key invalidated; next grant reloads it");
        }
    }

    /// Generate a signed URL for a single resource.
    ///
    /// `resource_path` may be a bare path (resolved against the CDN domain)
    /// or a full URL. The TTL defaults to the configured value and is capped
    /// at [`MAX_GRANT_TTL_SECS`].
    pub async fn signed_url(
        &self,
        resource_path: &str,
        ttl: Option<Duration>,
    ) -> StorageResult<SignedUrl> {
        let key_pair_id = self.key_pair_id()?;
        let url = self.resolve_url(resource_path)?;

        let ttl = self.effective_ttl(ttl);
        let expires_at = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;

        let policy = canned_policy(&url, expires_at);
        let signature = self.sign(policy.as_bytes()).await?;

        let separator = if url.contains('?') { '&' } else { '?' };
        let signed = format!(
            "{}{}Expires={}&Signature={}&Key-Pair-Id={}",
            url, separator, expires_at, signature, key_pair_id
        );

        Ok(SignedUrl {
            url: signed,
            expires_at,
            expires_in_secs: ttl.as_secs(),
        })
    }

    /// Generate a cookie grant for a resource prefix (e.g. `videos/x/*`).
    pub async fn cookie_grant(
        &self,
        resource_prefix: &str,
        ttl: Option<Duration>,
    ) -> StorageResult<CookieGrant> {
        let key_pair_id = self.key_pair_id()?;
        let url = self.resolve_url(resource_prefix)?;

        let ttl = self.effective_ttl(ttl);
        let expires_at = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;

        let policy = canned_policy(&url, expires_at);
        let signature = self.sign(policy.as_bytes()).await?;

        Ok(CookieGrant {
            policy: url_safe_b64(policy.as_bytes()),
            signature,
            key_pair_id: key_pair_id.to_string(),
            expires_at,
        })
    }

    /// Sign the playlist set of an adaptive-bitrate stream, one URL per
    /// variant playlist under `base_path`.
    pub async fn hls_signed_urls(
        &self,
        base_path: &str,
        variants: &[&str],
        ttl: Option<Duration>,
    ) -> StorageResult<HashMap<String, SignedUrl>> {
        let base = base_path.trim_end_matches('/');
        let mut urls = HashMap::with_capacity(variants.len());

        for variant in variants {
            let path = format!("{}/{}", base, variant);
            let signed = self.signed_url(&path, ttl).await?;
            urls.insert(variant.to_string(), signed);
        }

        Ok(urls)
    }

    fn key_pair_id(&self) -> StorageResult<&str> {
        self.config
            .key_pair_id
            .as_deref()
            .ok_or_else(|| StorageError::not_configured("CDN_KEY_PAIR_ID not set"))
    }

    fn resolve_url(&self, resource: &str) -> StorageResult<String> {
        if resource.starts_with("http://") || resource.starts_with("https://") {
            Ok(resource.to_string())
        } else {
            self.cdn_url(resource)
        }
    }

    fn effective_ttl(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.config.default_ttl)
            .min(Duration::from_secs(MAX_GRANT_TTL_SECS))
    }

    /// Sign a payload with the distribution's private key, returning the
    /// URL-safe base64 signature.
    async fn sign(&self, payload: &[u8]) -> StorageResult<String> {
        let key = self.signing_key().await?;
        let signature = key
            .try_sign(payload)
            .map_err(|e| StorageError::SignFailed(e.to_string()))?;
        Ok(url_safe_b64(&signature.to_bytes()))
    }

    /// Load the private key on first use, memoizing it for the process
    /// lifetime.
    async fn signing_key(&self) -> StorageResult<Arc<SigningKey<Sha1>>> {
        if let Some(key) = self.key.read().await.as_ref() {
            return Ok(Arc::clone(key));
        }

        let mut guard = self.key.write().await;
        // Lost the race: another caller loaded it while we waited.
        if let Some(key) = guard.as_ref() {
            return Ok(Arc::clone(key));
        }

        let path = self
            .config
            .private_key_path
            .as_ref()
            .ok_or_else(|| StorageError::not_configured("CDN_PRIVATE_KEY_PATH not set"))?;

        let pem = tokio::fs::read_to_string(path).await.map_err(|e| {
            StorageError::InvalidKey(format!("cannot read {}: {}", path.display(), e))
        })?;

        let private_key = RsaPrivateKey::from_pkcs8_pem(&pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
            .map_err(|e| StorageError::InvalidKey(format!("cannot parse PEM key: {}", e)))?;

        let key = Arc::new(SigningKey::<Sha1>::new(private_key));
        *guard = Some(Arc::clone(&key));

        info!("Delivery signing key loaded");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use std::sync::OnceLock;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::signature::Verifier;

    fn test_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| {
            let mut rng = rand::rngs::OsRng;
            RsaPrivateKey::new(&mut rng, 2048).expect("key generation")
        })
    }

    fn configured_service() -> (DeliveryService, tempfile::NamedTempFile) {
        let pem = test_key()
            .to_pkcs8_pem(LineEnding::LF)
            .expect("pem encoding");

        let mut file = tempfile::NamedTempFile::new().expect("temp key file");
        file.write_all(pem.as_bytes()).expect("write key");

        let config = DeliveryConfig {
            cdn_domain: Some("media.example.com".to_string()),
            key_pair_id: Some("KPAIRID123".to_string()),
            private_key_path: Some(file.path().to_path_buf()),
            default_ttl: Duration::from_secs(DEFAULT_GRANT_TTL_SECS),
        };

        (DeliveryService::new(config), file)
    }

    fn decode_url_safe(s: &str) -> Vec<u8> {
        let standard = s.replace('-', "+").replace('_', "=").replace('~', "/");
        STANDARD.decode(standard).expect("base64 decode")
    }

    #[test]
    fn test_canned_policy_shape() {
        let policy = canned_policy("https://media.example.com/videos/x/master.m3u8", 1_700_000_000);
        assert_eq!(
            policy,
            r#"{"Statement":[{"Resource":"https://media.example.com/videos/x/master.m3u8","Condition":{"DateLessThan":{"AWS:EpochTime":1700000000}}}]}"#
        );
    }

    #[test]
    fn test_url_safe_b64_has_no_reserved_chars() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let encoded = url_safe_b64(&bytes);
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
        assert_eq!(decode_url_safe(&encoded), bytes);
    }

    #[test]
    fn test_unconfigured_service_degrades() {
        let service = DeliveryService::new(DeliveryConfig::default());
        assert!(!service.is_configured());
    }

    #[tokio::test]
    async fn test_unconfigured_signed_url_is_config_error() {
        let service = DeliveryService::new(DeliveryConfig::default());
        let err = service.signed_url("videos/x/master.m3u8", None).await;
        assert!(matches!(err, Err(StorageError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_signed_url_params_and_expiry() {
        let (service, _key_file) = configured_service();
        assert!(service.is_configured());

        let before = chrono::Utc::now().timestamp();
        let grant = service
            .signed_url("videos/x/master.m3u8", Some(Duration::from_secs(3600)))
            .await
            .expect("signed url");
        let after = chrono::Utc::now().timestamp();

        assert!(grant
            .url
            .starts_with("https://media.example.com/videos/x/master.m3u8?Expires="));
        assert!(grant.url.contains("&Signature="));
        assert!(grant.url.ends_with("&Key-Pair-Id=KPAIRID123"));
        assert_eq!(grant.expires_in_secs, 3600);

        // Expires = issuance epoch + ttl, within clock-read slop
        assert!(grant.expires_at >= before + 3600);
        assert!(grant.expires_at <= after + 3600);
    }

    #[tokio::test]
    async fn test_signature_verifies_against_public_key() {
        let (service, _key_file) = configured_service();

        let grant = service
            .signed_url("videos/x/master.m3u8", Some(Duration::from_secs(600)))
            .await
            .expect("signed url");

        let sig_param = grant
            .url
            .split("Signature=")
            .nth(1)
            .and_then(|s| s.split('&').next())
            .expect("signature param");
        let sig_bytes = decode_url_safe(sig_param);

        let policy = canned_policy(
            "https://media.example.com/videos/x/master.m3u8",
            grant.expires_at,
        );

        let verifying_key = VerifyingKey::<Sha1>::new(test_key().to_public_key());
        let signature = Signature::try_from(sig_bytes.as_slice()).expect("signature bytes");
        verifying_key
            .verify(policy.as_bytes(), &signature)
            .expect("signature must verify");
    }

    #[tokio::test]
    async fn test_tampered_policy_does_not_verify() {
        let (service, _key_file) = configured_service();

        let grant = service
            .signed_url("videos/x/master.m3u8", Some(Duration::from_secs(600)))
            .await
            .expect("signed url");

        let sig_param = grant
            .url
            .split("Signature=")
            .nth(1)
            .and_then(|s| s.split('&').next())
            .expect("signature param");
        let sig_bytes = decode_url_safe(sig_param);

        // Same resource, expiry shifted by one second
        let tampered = canned_policy(
            "https://media.example.com/videos/x/master.m3u8",
            grant.expires_at + 1,
        );

        let verifying_key = VerifyingKey::<Sha1>::new(test_key().to_public_key());
        let signature = Signature::try_from(sig_bytes.as_slice()).expect("signature bytes");
        assert!(verifying_key.verify(tampered.as_bytes(), &signature).is_err());
    }

    #[tokio::test]
    async fn test_cookie_grant_policy_roundtrip() {
        let (service, _key_file) = configured_service();

        let grant = service
            .cookie_grant("videos/x/*", Some(Duration::from_secs(900)))
            .await
            .expect("cookie grant");

        assert_eq!(grant.key_pair_id, "KPAIRID123");

        let policy = String::from_utf8(decode_url_safe(&grant.policy)).expect("utf8 policy");
        assert!(policy.contains(r#""Resource":"https://media.example.com/videos/x/*""#));
        assert!(policy.contains(&format!(r#""AWS:EpochTime":{}"#, grant.expires_at)));

        let verifying_key = VerifyingKey::<Sha1>::new(test_key().to_public_key());
        let signature =
            Signature::try_from(decode_url_safe(&grant.signature).as_slice()).expect("signature");
        verifying_key
            .verify(policy.as_bytes(), &signature)
            .expect("cookie signature must verify");
    }

    #[tokio::test]
    async fn test_ttl_is_capped() {
        let (service, _key_file) = configured_service();

        let before = chrono::Utc::now().timestamp();
        let grant = service
            .signed_url(
                "videos/x/master.m3u8",
                Some(Duration::from_secs(MAX_GRANT_TTL_SECS * 10)),
            )
            .await
            .expect("signed url");

        assert_eq!(grant.expires_in_secs, MAX_GRANT_TTL_SECS);
        assert!(grant.expires_at <= before + MAX_GRANT_TTL_SECS as i64 + 5);
    }

    #[tokio::test]
    async fn test_hls_signed_urls_cover_variants() {
        let (service, _key_file) = configured_service();

        let urls = service
            .hls_signed_urls("videos/x/hls", &["master.m3u8", "720p.m3u8"], None)
            .await
            .expect("hls urls");

        assert_eq!(urls.len(), 2);
        assert!(urls["master.m3u8"]
            .url
            .starts_with("https://media.example.com/videos/x/hls/master.m3u8?Expires="));
        assert!(urls["720p.m3u8"]
            .url
            .starts_with("https://media.example.com/videos/x/hls/720p.m3u8?Expires="));
    }

    #[tokio::test]
    async fn test_invalidate_key_reloads() {
        let (service, _key_file) = configured_service();

        service.signed_url("videos/a.mp4", None).await.expect("first grant");
        assert!(service.key.read().await.is_some());

        service.invalidate_key().await;
        assert!(service.key.read().await.is_none());

        // Next grant reloads the key from disk
        service.signed_url("videos/a.mp4", None).await.expect("grant after rotation");
        assert!(service.key.read().await.is_some());
    }
}
