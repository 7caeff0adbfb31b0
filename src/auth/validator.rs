//! 凭证校验器
//!
//! 校验器从请求中提取原始凭证，并判断某条用户记录是否与该凭证匹配。
//! 校验器本身不保存任何请求级状态，可以在并发请求间共享。

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::model::UserAuthInfo;
use crate::core::config::AuthConfig;
use crate::router::WebRequest;
use crate::utils::{CoreError, Result};

const AUTHORIZATION: &str = "Authorization";

/// 凭证校验器
pub trait AuthValidator: Send + Sync {
    /// 校验器名称，与配置中的 `auth.type` 对应
    fn name(&self) -> &str;

    /// 从请求中提取凭证
    fn validate_key(&self, req: &WebRequest) -> Result<String>;

    /// 判断用户记录是否与凭证匹配
    ///
    /// `Ok(true)` 表示匹配，`Ok(false)` 表示不是该用户，`Err` 表示凭证本身无效。
    fn verify_user(&self, req: &WebRequest, credential: &str, user: &UserAuthInfo) -> Result<bool>;
}

fn strip_scheme<'a>(req: &'a WebRequest, scheme: &str) -> Result<&'a str> {
    let header = req
        .header(AUTHORIZATION)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CoreError::MissingCredential("Authorization header required".to_string()))?;

    header.strip_prefix(scheme).ok_or_else(|| {
        CoreError::MissingCredential(format!(
            "Authorization header must start with '{}'",
            scheme.trim_end()
        ))
    })
}

// ==================== API Key ====================

/// API Key 校验器
///
/// 先读取配置的请求头（默认 `X-API-Key`），为空时回退到
/// `Authorization: APIKey <key>`。配置了前缀时凭证必须带该前缀，比对前去掉。
#[derive(Debug, Clone)]
pub struct ApiKeyValidator {
    header: String,
    prefix: String,
}

impl ApiKeyValidator {
    pub fn new(header: impl Into<String>, prefix: impl Into<String>) -> Self {
        let header = header.into();
        Self {
            header: if header.is_empty() {
                "X-API-Key".to_string()
            } else {
                header
            },
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.api_key_header.clone(), config.api_key_prefix.clone())
    }
}

impl AuthValidator for ApiKeyValidator {
    fn name(&self) -> &str {
        "apikey"
    }

    fn validate_key(&self, req: &WebRequest) -> Result<String> {
        let key = match req.header(&self.header).filter(|v| !v.is_empty()) {
            Some(value) => value,
            None => strip_scheme(req, "APIKey ")?,
        };

        let key = if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(self.prefix.as_str()).ok_or_else(|| {
                CoreError::InvalidCredential("API key is missing the required prefix".to_string())
            })?
        };

        Ok(key.to_string())
    }

    fn verify_user(&self, _req: &WebRequest, credential: &str, user: &UserAuthInfo) -> Result<bool> {
        Ok(!credential.is_empty() && credential == user.user_id())
    }
}

// ==================== JWT ====================

/// JWT 声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户标识
    pub sub: String,
    /// 过期时间（Unix 时间戳）
    pub exp: i64,
    /// 签发时间（Unix 时间戳）
    pub iat: i64,
}

/// JWT 校验器（HS256）
#[derive(Clone)]
pub struct JwtValidator {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    validation: Validation,
    expires_in_secs: u64,
}

impl JwtValidator {
    pub fn new(secret: &str, expires_in_secs: u64) -> Result<Self> {
        if secret.is_empty() {
            return Err(CoreError::InvalidConfigValue {
                key: "auth.secret_key".to_string(),
                reason: "JWT 认证需要签名密钥".to_string(),
            });
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        Ok(Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            validation,
            expires_in_secs,
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::new(&config.secret_key, config.expires_in_secs)
    }

    /// 为用户签发令牌，有效期取自 `auth.expires_in_secs`
    pub fn issue_token(&self, user_id: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + Duration::seconds(self.expires_in_secs as i64)).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| CoreError::Internal(format!("JWT 签发失败: {}", e)))
    }

    /// 校验签名与有效期并返回声明
    pub fn decode_claims(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "JWT 校验失败");
                CoreError::InvalidCredential("Invalid or expired token".to_string())
            })
    }
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("expires_in_secs", &self.expires_in_secs)
            .finish_non_exhaustive()
    }
}

impl AuthValidator for JwtValidator {
    fn name(&self) -> &str {
        "jwt"
    }

    fn validate_key(&self, req: &WebRequest) -> Result<String> {
        Ok(strip_scheme(req, "Bearer ")?.to_string())
    }

    fn verify_user(&self, _req: &WebRequest, credential: &str, user: &UserAuthInfo) -> Result<bool> {
        if credential.is_empty() {
            return Ok(false);
        }
        let claims = self.decode_claims(credential)?;
        Ok(claims.sub == user.user_id())
    }
}

// ==================== Basic ====================

/// Basic 认证校验器
#[derive(Debug, Clone, Default)]
pub struct BasicValidator;

impl BasicValidator {
    pub fn new() -> Self {
        Self
    }

    /// 解码 `base64(user:password)`
    pub fn decode_credentials(credential: &str) -> Option<(String, String)> {
        let decoded = STANDARD.decode(credential.trim()).ok()?;
        let text = String::from_utf8(decoded).ok()?;
        let (user, password) = text.split_once(':')?;
        if user.is_empty() || password.is_empty() {
            return None;
        }
        Some((user.to_string(), password.to_string()))
    }
}

impl AuthValidator for BasicValidator {
    fn name(&self) -> &str {
        "basic"
    }

    fn validate_key(&self, req: &WebRequest) -> Result<String> {
        Ok(strip_scheme(req, "Basic ")?.to_string())
    }

    /// 用户名相同且密码一致时匹配
    ///
    /// 注意：记录中没有 `password` 时只比较用户名，任意密码都能通过，
    /// 使用 Basic 认证的用户都应配置密码。
    fn verify_user(&self, _req: &WebRequest, credential: &str, user: &UserAuthInfo) -> Result<bool> {
        let Some((username, password)) = Self::decode_credentials(credential) else {
            return Ok(false);
        };
        // 没有用户名的记录不参与 Basic 认证
        let Some(expected_user) = user.username() else {
            return Ok(false);
        };
        if expected_user != username {
            return Ok(false);
        }
        Ok(user.password().map_or(true, |expected| expected == password))
    }
}
