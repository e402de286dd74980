//! Signed, time-bounded references to file content.
//!
//! A signed URL names the file, the operation it allows, the user it was
//! issued to and its expiry. The signature is an HMAC-SHA256 of those fields
//! under the server secret, so none of them can be altered by the holder.

use super::error::{ServiceError, ServiceResult};
use crate::models::file::SignedUrl;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{fmt, sync::Arc};
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Lifetime of upload URLs, in seconds.
pub const UPLOAD_URL_TTL_SECS: i64 = 60 * 60;

/// Lifetime of download URLs, in seconds.
pub const DOWNLOAD_URL_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignedOp {
    Upload,
    Download,
}

impl fmt::Display for SignedOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignedOp::Upload => "upload",
            SignedOp::Download => "download",
        })
    }
}

/// Query parameters carried by a signed URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedParams {
    pub op: SignedOp,
    pub uid: Uuid,
    pub expires: i64,
    pub signature: String,
}

#[derive(Clone)]
pub struct UrlSigner {
    secret: Arc<[u8]>,
    base_url: String,
}

impl UrlSigner {
    pub fn new(secret: &[u8], base_url: impl Into<String>) -> Self {
        Self {
            secret: Arc::from(secret),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn sign(
        &self,
        op: SignedOp,
        file_id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> ServiceResult<SignedUrl> {
        let expires = expires_at.timestamp();
        let signature = self.signature(op, file_id, user_id, expires)?;
        let url = format!(
            "{}/api/v1/blobs/{}?op={}&uid={}&expires={}&signature={}",
            self.base_url, file_id, op, user_id, expires, signature
        );

        Ok(SignedUrl {
            url,
            // Truncated to whole seconds, matching what the URL carries.
            expires_at: Utc
                .timestamp_opt(expires, 0)
                .single()
                .unwrap_or(expires_at),
        })
    }

    /// Check that `params` were issued by this server for `file_id` and
    /// `expected` and have not expired.
    pub fn verify(
        &self,
        file_id: Uuid,
        expected: SignedOp,
        params: &SignedParams,
    ) -> ServiceResult<()> {
        if params.op != expected {
            return Err(ServiceError::Unauthenticated(format!(
                "signed url does not allow {}",
                expected
            )));
        }

        if Utc::now().timestamp() >= params.expires {
            return Err(ServiceError::Unauthenticated("signed url expired".into()));
        }

        let computed = self.signature(params.op, file_id, params.uid, params.expires)?;
        if !bool::from(computed.as_bytes().ct_eq(params.signature.as_bytes())) {
            return Err(ServiceError::Unauthenticated("invalid signature".into()));
        }

        Ok(())
    }

    fn signature(
        &self,
        op: SignedOp,
        file_id: Uuid,
        user_id: Uuid,
        expires: i64,
    ) -> ServiceResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| ServiceError::Internal(format!("url signing key: {}", err)))?;
        mac.update(format!("{}:{}:{}:{}", op, file_id, user_id, expires).as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }
}
