//! SDK error mapping onto the object store port's taxonomy.

use aws_sdk_s3::error::SdkError;

use deltaglider_core::StoreError;

/// Map a generic SDK error onto the port's error taxonomy.
///
/// 404 becomes `NotFound`; 5xx and 429 become `Transient` (retried);
/// remaining 4xx become `Permanent`; transport-level failures are
/// `Transient`.
pub(crate) fn map_sdk_error<E>(bucket: &str, key: &str, err: SdkError<E>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(ctx) => {
            let status: u16 = ctx.raw().status().as_u16();
            let message: String = ctx.err().to_string();
            match status {
                404 => StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                },
                429 | 500..=599 => StoreError::Transient {
                    message,
                    attempts: 1,
                },
                _ => StoreError::Permanent { status, message },
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StoreError::Transient {
                message: err.to_string(),
                attempts: 1,
            }
        }
        _ => StoreError::Transient {
            message: err.to_string(),
            attempts: 1,
        },
    }
}

#[cfg(test)]
mod tests {
    use deltaglider_core::StoreError;

    #[test]
    fn test_transient_is_retryable_permanent_is_not() {
        let throttled: StoreError = StoreError::Transient {
            message: "503".to_string(),
            attempts: 1,
        };
        assert!(throttled.is_retryable());

        let denied: StoreError = StoreError::Permanent {
            status: 403,
            message: "denied".to_string(),
        };
        assert!(!denied.is_retryable());

        let missing: StoreError = StoreError::NotFound {
            bucket: "b".to_string(),
            key: "k".to_string(),
        };
        assert!(!missing.is_retryable());
    }
}
