//! The single error type that crosses the repository boundary.
//!
//! Transport, HTTP, and crypto failures are classified into an [`ErrorCode`]
//! plus an optional HTTP status. The UI layer renders
//! [`RepositoryError::user_message`] and never sees the underlying cause.

use companion_crypto::error::CryptoError;
use companion_shared::error::CompanionError;

use crate::remote::RemoteError;

/// Classification of a repository failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Network,
    Timeout,
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimited,
    Conflict,
    InvalidInput,
    Server,
    Client,
    KeyStoreUnavailable,
    EncryptionFailed,
    DecryptionFailed,
    Unknown,
}

impl ErrorCode {
    /// Stable machine-readable code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Network => "network_error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::Conflict => "conflict",
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::Server => "server_error",
            ErrorCode::Client => "client_error",
            ErrorCode::KeyStoreUnavailable => "key_store_unavailable",
            ErrorCode::EncryptionFailed => "encryption_failed",
            ErrorCode::DecryptionFailed => "decryption_failed",
            ErrorCode::Unknown => "unknown",
        }
    }

    fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => ErrorCode::InvalidInput,
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            408 => ErrorCode::Timeout,
            409 => ErrorCode::Conflict,
            429 => ErrorCode::RateLimited,
            400..=499 => ErrorCode::Client,
            500..=599 => ErrorCode::Server,
            _ => ErrorCode::Unknown,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language used for user-facing error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Tr,
}

impl Locale {
    /// Parse a language tag such as `"tr"` or `"tr-TR"`. Unknown tags map to English.
    pub fn from_tag(tag: &str) -> Self {
        let primary = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "tr" => Locale::Tr,
            _ => Locale::En,
        }
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A classified repository failure.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RepositoryError {
    code: ErrorCode,
    status: Option<u16>,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl RepositoryError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_network_error(&self) -> bool {
        matches!(self.code, ErrorCode::Network | ErrorCode::Timeout)
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self.status, Some(401 | 403))
            || matches!(self.code, ErrorCode::Unauthorized | ErrorCode::Forbidden)
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self.status, Some(500..=599)) || self.code == ErrorCode::Server
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self.status, Some(400..=499))
            || matches!(
                self.code,
                ErrorCode::InvalidInput
                    | ErrorCode::Client
                    | ErrorCode::Unauthorized
                    | ErrorCode::Forbidden
                    | ErrorCode::NotFound
                    | ErrorCode::Conflict
                    | ErrorCode::RateLimited
            )
    }

    /// A localized message safe to show to the user.
    pub fn user_message(&self, locale: Locale) -> &'static str {
        let (en, tr) = if self.code == ErrorCode::Timeout {
            (
                "The request timed out. Please try again.",
                "İstek zaman aşımına uğradı. Lütfen tekrar deneyin.",
            )
        } else if self.is_network_error() {
            (
                "Check your internet connection and try again.",
                "İnternet bağlantınızı kontrol edip tekrar deneyin.",
            )
        } else if self.is_auth_error() {
            (
                "Your session has expired. Please sign in again.",
                "Oturumunuzun süresi doldu. Lütfen tekrar giriş yapın.",
            )
        } else if self.code == ErrorCode::RateLimited {
            (
                "Too many requests. Please wait a moment and try again.",
                "Çok fazla istek gönderildi. Lütfen biraz bekleyip tekrar deneyin.",
            )
        } else if self.is_server_error() {
            (
                "Something went wrong on our side. Please try again later.",
                "Sunucu tarafında bir sorun oluştu. Lütfen daha sonra tekrar deneyin.",
            )
        } else {
            match self.code {
                ErrorCode::KeyStoreUnavailable => (
                    "Secure storage is unavailable. Unlock your device and try again.",
                    "Güvenli depolama kullanılamıyor. Cihazınızın kilidini açıp tekrar deneyin.",
                ),
                ErrorCode::EncryptionFailed | ErrorCode::DecryptionFailed => (
                    "Your messages could not be secured. Please try again.",
                    "Mesajlarınız güvenli hale getirilemedi. Lütfen tekrar deneyin.",
                ),
                ErrorCode::NotFound => (
                    "The conversation could not be found.",
                    "Sohbet bulunamadı.",
                ),
                ErrorCode::InvalidInput | ErrorCode::Client | ErrorCode::Conflict => (
                    "The request could not be completed.",
                    "İstek tamamlanamadı.",
                ),
                _ => (
                    "An unexpected error occurred.",
                    "Beklenmeyen bir hata oluştu.",
                ),
            }
        };
        match locale {
            Locale::En => en,
            Locale::Tr => tr,
        }
    }
}

impl From<RemoteError> for RepositoryError {
    fn from(err: RemoteError) -> Self {
        match &err {
            RemoteError::Network { timeout: true, .. } => {
                RepositoryError::new(ErrorCode::Timeout, "remote store request timed out")
                    .with_source(err)
            }
            RemoteError::Network { .. } => {
                RepositoryError::new(ErrorCode::Network, "remote store unreachable")
                    .with_source(err)
            }
            RemoteError::Http { status, .. } => {
                let status = *status;
                RepositoryError::new(
                    ErrorCode::from_status(status),
                    format!("remote store returned HTTP {status}"),
                )
                .with_status(status)
                .with_source(err)
            }
            RemoteError::Decode(_) => {
                RepositoryError::new(ErrorCode::Unknown, "unexpected remote store response")
                    .with_source(err)
            }
        }
    }
}

impl From<CryptoError> for RepositoryError {
    fn from(err: CryptoError) -> Self {
        let code = match &err {
            CryptoError::KeyStoreUnavailable => ErrorCode::KeyStoreUnavailable,
            CryptoError::EncryptionFailed(_) => ErrorCode::EncryptionFailed,
            CryptoError::DecryptionFailed(_) => ErrorCode::DecryptionFailed,
            _ => ErrorCode::Unknown,
        };
        RepositoryError::new(code, err.to_string()).with_source(err)
    }
}

impl From<tokio::task::JoinError> for RepositoryError {
    fn from(err: tokio::task::JoinError) -> Self {
        RepositoryError::new(ErrorCode::Unknown, "background task failed").with_source(err)
    }
}

impl From<RepositoryError> for CompanionError {
    fn from(err: RepositoryError) -> Self {
        match err.code {
            ErrorCode::Network | ErrorCode::Timeout => CompanionError::Network(err.message),
            ErrorCode::Unauthorized | ErrorCode::Forbidden => CompanionError::Unauthorized,
            ErrorCode::NotFound => CompanionError::NotFound,
            ErrorCode::RateLimited => CompanionError::RateLimited,
            ErrorCode::InvalidInput | ErrorCode::Client | ErrorCode::Conflict => {
                CompanionError::Validation(err.message)
            }
            ErrorCode::KeyStoreUnavailable => CompanionError::ServiceUnavailable(err.message),
            ErrorCode::EncryptionFailed | ErrorCode::DecryptionFailed => {
                CompanionError::Crypto(err.message)
            }
            ErrorCode::Server | ErrorCode::Unknown => CompanionError::Internal(err.message),
        }
    }
}
