use thiserror::Error;

/// Coarse origin of a failure, used to pick retry behaviour and the
/// message shown to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Config,
    Auth,
    Quota,
    Transient,
    Safety,
    Malformed,
    Precondition,
    Request,
}

/// Failure raised at the service boundary (text, prompt and image
/// generation). Every message carries a stable token so that text-only
/// consumers can still classify it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("PERMISSION_DENIED (API_KEY_INVALID): {0}")]
    Auth(String),

    #[error("RESOURCE_EXHAUSTED (429): {0}")]
    Quota(String),

    #[error("INTERNAL server error: {0}")]
    Transient(String),

    #[error("SAFETY: {0}")]
    Safety(String),

    #[error("empty response: {0}")]
    EmptyResponse(String),

    #[error("no candidates in response")]
    NoCandidates,

    #[error("NO_IMAGE: model did not produce an image")]
    NoImage,

    #[error("abnormal finish reason: {0}")]
    AbnormalFinish(String),

    #[error("response contained no inline image data")]
    MissingImageData,

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl GenerationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_) => ErrorClass::Config,
            Self::Auth(_) => ErrorClass::Auth,
            Self::Quota(_) => ErrorClass::Quota,
            Self::Transient(_) => ErrorClass::Transient,
            Self::Safety(_) => ErrorClass::Safety,
            Self::EmptyResponse(_)
            | Self::NoCandidates
            | Self::NoImage
            | Self::AbnormalFinish(_)
            | Self::MissingImageData => ErrorClass::Malformed,
            Self::Precondition(_) => ErrorClass::Precondition,
            Self::Request(_) => ErrorClass::Request,
        }
    }

    /// Whether the text and prompt clients may spend another attempt on
    /// this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::EmptyResponse(_))
    }
}

const MSG_AUTH: &str = "API 키가 올바르지 않습니다. 관리자에게 문의하세요.";
const MSG_SAFETY: &str = "시나리오 내용이 안전 정책에 의해 차단되었습니다. 시나리오 텍스트를 다시 생성하거나, 조금 더 순화된 표현으로 다시 시도해보세요.";
const MSG_BUSY: &str = "서버가 혼잡하여 응답이 지연되고 있습니다. 잠시 후 다시 시도해주세요.";
const MSG_NO_IMAGE: &str = "이미지를 생성하지 못했습니다. 다시 시도해도 오류가 발생한다면, 캐릭터 설정이나 배경을 조금 단순하게 변경하여 다시 시도해주세요.";
const MSG_QUOTA: &str = "요청 횟수 제한을 초과했습니다. 잠시 기다렸다가 다시 시도해주세요.";
const MSG_EMPTY: &str = "모델이 빈 응답을 반환했습니다. 잠시 후 다시 시도해주세요.";
const MSG_CONFIG: &str = "API 키가 설정되지 않았습니다. 환경 변수를 확인해주세요.";

/// Player-facing message for a typed failure.
pub fn friendly_message(err: &GenerationError) -> String {
    match err.class() {
        ErrorClass::Config => MSG_CONFIG.to_string(),
        ErrorClass::Auth => MSG_AUTH.to_string(),
        ErrorClass::Safety => MSG_SAFETY.to_string(),
        ErrorClass::Transient => MSG_BUSY.to_string(),
        ErrorClass::Quota => MSG_QUOTA.to_string(),
        ErrorClass::Malformed => match err {
            GenerationError::EmptyResponse(_) => MSG_EMPTY.to_string(),
            _ => MSG_NO_IMAGE.to_string(),
        },
        ErrorClass::Precondition => match err {
            GenerationError::Precondition(msg) => msg.clone(),
            other => other.to_string(),
        },
        ErrorClass::Request => friendly_message_for(&err.to_string()),
    }
}

/// Same mapping as [`friendly_message`] for untyped error text. Unknown
/// text is returned unchanged.
pub fn friendly_message_for(message: &str) -> String {
    let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

    if has(&["403", "API_KEY_INVALID", "API key not valid", "PERMISSION_DENIED"]) {
        return MSG_AUTH.to_string();
    }
    if has(&["SAFETY", "PROHIBITED_CONTENT"]) {
        return MSG_SAFETY.to_string();
    }
    if has(&["503", "504", "INTERNAL", "OVERLOADED", "Gateway Timeout"]) {
        return MSG_BUSY.to_string();
    }
    if has(&["NO_IMAGE", "no inline image data", "no candidates", "abnormal finish"]) {
        return MSG_NO_IMAGE.to_string();
    }
    if has(&["empty response"]) {
        return MSG_EMPTY.to_string();
    }
    if has(&["429", "QUOTA", "Too Many Requests", "RESOURCE_EXHAUSTED"]) {
        return MSG_QUOTA.to_string();
    }
    message.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_and_textual_mapping_agree() {
        let cases = [
            GenerationError::Auth("bad key".into()),
            GenerationError::Safety("blocked".into()),
            GenerationError::Transient("overloaded".into()),
            GenerationError::Quota("slow down".into()),
            GenerationError::NoImage,
            GenerationError::MissingImageData,
            GenerationError::NoCandidates,
            GenerationError::AbnormalFinish("MAX_TOKENS".into()),
            GenerationError::EmptyResponse("model returned no text".into()),
        ];
        for err in cases {
            assert_eq!(friendly_message(&err), friendly_message_for(&err.to_string()), "{err}");
        }
    }

    #[test]
    fn empty_text_is_not_reported_as_image_failure() {
        let msg = friendly_message(&GenerationError::EmptyResponse("model returned no text".into()));
        assert_eq!(msg, MSG_EMPTY);
        assert_ne!(msg, MSG_NO_IMAGE);
        assert_eq!(friendly_message(&GenerationError::NoImage), MSG_NO_IMAGE);
    }

    #[test]
    fn unknown_text_passes_through() {
        assert_eq!(friendly_message_for("disk on fire"), "disk on fire");
        let err = GenerationError::Request("HTTP 418: teapot".into());
        assert_eq!(friendly_message(&err), "request failed: HTTP 418: teapot");
    }

    #[test]
    fn only_transient_and_empty_are_retryable() {
        assert!(GenerationError::Transient("x".into()).is_retryable());
        assert!(GenerationError::EmptyResponse("x".into()).is_retryable());
        assert!(!GenerationError::Quota("x".into()).is_retryable());
        assert!(!GenerationError::Auth("x".into()).is_retryable());
        assert!(!GenerationError::Safety("x".into()).is_retryable());
    }
}
