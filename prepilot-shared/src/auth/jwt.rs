/// Clerk session token verification
///
/// Clerk issues RS256-signed session JWTs. Tokens are always verified
/// against a signing key; there is no decode-only fallback.
///
/// # Key Sources
///
/// - **PEM**: the instance's public key (`CLERK_JWT_KEY`), no network needed
/// - **JWKS**: keys fetched from the instance's JWKS endpoint, cached for an
///   hour and refreshed immediately when a token names an unknown `kid`
///
/// # Validation
///
/// - **Algorithm**: RS256 only
/// - **Time**: `exp` and `nbf` with a small leeway
/// - **Subject**: `sub` must be present and non-empty
/// - **Authorized parties**: when configured, a present `azp` claim must be
///   in the allow-list
///
/// # Example
///
/// ```no_run
/// use prepilot_shared::auth::identity::IdentityVerifier;
/// use prepilot_shared::auth::jwt::ClerkJwtVerifier;
///
/// # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let verifier = ClerkJwtVerifier::from_jwks_url(
///     "https://clerk.example.com/.well-known/jwks.json",
///     None,
///     vec!["https://app.example.com".to_string()],
/// )?;
///
/// let identity = verifier.verify(token).await?;
/// println!("Authenticated {}", identity.clerk_id);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::identity::{Identity, IdentityError, IdentityVerifier};

/// How long fetched keys are trusted before a routine refresh
const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Minimum age of the cached key set before an unknown `kid` triggers a refetch
const JWKS_REFRESH_COOLDOWN: Duration = Duration::from_secs(30);

const JWKS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const JWKS_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Clock skew tolerated on `exp` / `nbf` (seconds)
const LEEWAY_SECS: u64 = 5;

/// Claims of a Clerk session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Clerk user ID
    pub sub: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    #[serde(default)]
    pub iat: Option<i64>,

    #[serde(default)]
    pub nbf: Option<i64>,

    /// Origin the token was issued for
    #[serde(default)]
    pub azp: Option<String>,

    /// Session ID
    #[serde(default)]
    pub sid: Option<String>,

    /// Only present when the session token template adds it
    #[serde(default)]
    pub email: Option<String>,
}

struct CachedKeys {
    keys: Vec<(String, DecodingKey)>,
    fetched_at: Instant,
}

enum KeySource {
    Pem(DecodingKey),
    Jwks {
        url: String,
        secret_key: Option<String>,
        cache: Arc<RwLock<Option<CachedKeys>>>,
        http_client: reqwest::Client,
    },
}

#[derive(Deserialize)]
struct JwksResponse {
    keys: Vec<serde_json::Value>,
}

/// Parses a JWKS document into `(kid, key)` pairs
///
/// Keys without a `kid`, or that cannot be turned into a decoding key,
/// are skipped.
pub fn parse_jwks(body: &[u8]) -> Result<Vec<(String, DecodingKey)>, IdentityError> {
    let response: JwksResponse = serde_json::from_slice(body)
        .map_err(|e| IdentityError::KeySource(format!("Failed to parse JWKS response: {}", e)))?;

    let mut keys = Vec::new();
    for value in response.keys {
        let jwk: jsonwebtoken::jwk::Jwk = match serde_json::from_value(value) {
            Ok(jwk) => jwk,
            Err(e) => {
                warn!("Skipping unparseable JWK: {}", e);
                continue;
            }
        };

        let Some(kid) = jwk.common.key_id.clone() else {
            continue;
        };
        match DecodingKey::from_jwk(&jwk) {
            Ok(key) => keys.push((kid, key)),
            Err(e) => warn!(kid = %kid, "Failed to create decoding key from JWK: {}", e),
        }
    }

    Ok(keys)
}

/// [`IdentityVerifier`] for Clerk session tokens
pub struct ClerkJwtVerifier {
    source: KeySource,
    authorized_parties: Vec<String>,
}

impl ClerkJwtVerifier {
    /// Verifies with a fixed PEM-encoded RSA public key
    ///
    /// Literal `\n` sequences (as found in single-line env values) are
    /// turned into newlines first.
    pub fn from_pem(pem: &str, authorized_parties: Vec<String>) -> Result<Self, IdentityError> {
        let pem = pem.replace("\\n", "\n");
        let key = DecodingKey::from_rsa_pem(pem.trim().as_bytes())
            .map_err(|e| IdentityError::KeySource(format!("Invalid PEM public key: {}", e)))?;

        info!(authorized_parties = ?authorized_parties, "Session token verifier using static public key");

        Ok(Self {
            source: KeySource::Pem(key),
            authorized_parties,
        })
    }

    /// Verifies with keys fetched from a JWKS endpoint
    ///
    /// `secret_key`, when given, is sent as a bearer token on the fetch
    /// (required by Clerk's backend API JWKS endpoint).
    pub fn from_jwks_url(
        url: &str,
        secret_key: Option<String>,
        authorized_parties: Vec<String>,
    ) -> Result<Self, IdentityError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(JWKS_CONNECT_TIMEOUT)
            .timeout(JWKS_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IdentityError::KeySource(format!("Failed to build HTTP client: {}", e)))?;

        info!(jwks_url = url, authorized_parties = ?authorized_parties, "Session token verifier using JWKS");

        Ok(Self {
            source: KeySource::Jwks {
                url: url.to_string(),
                secret_key,
                cache: Arc::new(RwLock::new(None)),
                http_client,
            },
            authorized_parties,
        })
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = LEEWAY_SECS;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation
    }

    /// Decodes and checks a token, returning its claims
    pub async fn verify_claims(&self, token: &str) -> Result<SessionClaims, IdentityError> {
        let header = decode_header(token)
            .map_err(|e| IdentityError::InvalidToken(format!("Invalid token header: {}", e)))?;

        let key = self.key_for(header.kid.as_deref()).await?;

        let claims = decode::<SessionClaims>(token, &key, &Self::validation())
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => IdentityError::Expired,
                _ => IdentityError::InvalidToken(e.to_string()),
            })?
            .claims;

        if claims.sub.trim().is_empty() {
            return Err(IdentityError::InvalidToken("Missing subject".to_string()));
        }

        if !self.authorized_parties.is_empty() {
            if let Some(ref azp) = claims.azp {
                if !self.authorized_parties.iter().any(|p| p == azp) {
                    warn!(azp = %azp, "Session token issued for unauthorized party");
                    return Err(IdentityError::UnauthorizedParty);
                }
            }
        }

        Ok(claims)
    }

    async fn key_for(&self, kid: Option<&str>) -> Result<DecodingKey, IdentityError> {
        match &self.source {
            KeySource::Pem(key) => Ok(key.clone()),
            KeySource::Jwks { .. } => {
                let kid = kid.ok_or_else(|| IdentityError::InvalidToken("Missing kid header".to_string()))?;

                let keys = self.jwks(false).await?;
                if let Some((_, key)) = keys.iter().find(|(k, _)| k == kid) {
                    return Ok(key.clone());
                }

                // Unknown kid: the signing key may have rotated
                info!(kid, "Key ID not cached, refreshing JWKS");
                let keys = self.jwks(true).await?;
                keys.iter()
                    .find(|(k, _)| k == kid)
                    .map(|(_, key)| key.clone())
                    .ok_or_else(|| IdentityError::UnknownKey(kid.to_string()))
            }
        }
    }

    /// Cached keys, or freshly fetched ones when stale, or when `force_refresh`
    /// is set and the cache is older than the refresh cooldown
    async fn jwks(&self, force_refresh: bool) -> Result<Vec<(String, DecodingKey)>, IdentityError> {
        let KeySource::Jwks {
            url,
            secret_key,
            cache,
            http_client,
        } = &self.source
        else {
            return Ok(Vec::new());
        };

        if let Some(ref cached) = *cache.read().await {
            let max_age = if force_refresh { JWKS_REFRESH_COOLDOWN } else { JWKS_CACHE_TTL };
            if cached.fetched_at.elapsed() < max_age {
                if force_refresh {
                    debug!("JWKS fetched recently, skipping forced refresh");
                }
                return Ok(cached.keys.clone());
            }
        }

        debug!(jwks_url = %url, "Fetching JWKS");
        let mut request = http_client.get(url);
        if let Some(secret) = secret_key {
            request = request.bearer_auth(secret);
        }

        let fetched = async {
            let body = request
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| IdentityError::KeySource(format!("Failed to fetch JWKS: {}", e)))?
                .bytes()
                .await
                .map_err(|e| IdentityError::KeySource(format!("Failed to read JWKS: {}", e)))?;
            parse_jwks(&body)
        }
        .await;

        match fetched {
            Ok(keys) => {
                info!(count = keys.len(), "Loaded JWKS keys");
                *cache.write().await = Some(CachedKeys {
                    keys: keys.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(keys)
            }
            Err(e) => {
                // Fall back to stale keys on a routine refresh
                if !force_refresh {
                    if let Some(ref cached) = *cache.read().await {
                        warn!("Failed to refresh JWKS, using stale cache: {}", e);
                        return Ok(cached.keys.clone());
                    }
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl IdentityVerifier for ClerkJwtVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let claims = self.verify_claims(token).await?;

        Ok(Identity {
            clerk_id: claims.sub,
            email: claims.email.filter(|e| !e.trim().is_empty()),
        })
    }
}
