use std::{error::Error, fmt, future::Future, io, time::Duration};

/// The result of a request that crosses an actor boundary.
pub type RpcResult<T> = std::result::Result<T, RpcErr>;

/// The failure modes of a bounded request against another actor.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcErr {
    /// No reply arrived within the bounded wait. The remote operation is not cancelled.
    Timeout { what: &'static str, after: Duration },
    /// The peer could not be reached or its mailbox is closed.
    Unavailable(String),
    /// The peer refused the request because its dimensions disagree with its model.
    ShapeMismatch(String),
    /// The peer answered with something the protocol does not allow at this point.
    Protocol(String),
}

impl RpcErr {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable(_))
    }
}

impl fmt::Display for RpcErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { what, after } => {
                write!(f, "timed out after {after:?} waiting for {what}")
            }
            Self::Unavailable(detail) => write!(f, "peer unavailable: {detail}"),
            Self::ShapeMismatch(detail) => write!(f, "shape mismatch: {detail}"),
            Self::Protocol(detail) => write!(f, "protocol violation: {detail}"),
        }
    }
}

impl Error for RpcErr {}

impl From<io::Error> for RpcErr {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::InvalidData => Self::Protocol(value.to_string()),
            _ => Self::Unavailable(value.to_string()),
        }
    }
}

/// Awaits `fut` for at most `after`, turning an elapsed wait into `RpcErr::Timeout`.
///
/// # Arguments
/// * `what` - A short name of the awaited reply, used in the error.
/// * `after` - The maximum wait.
/// * `fut` - The request future.
///
/// # Returns
/// The request's own result, or a timeout error.
pub async fn bounded<T, F>(what: &'static str, after: Duration, fut: F) -> RpcResult<T>
where
    F: Future<Output = RpcResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(res) => res,
        Err(_) => Err(RpcErr::Timeout { what, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_wait_reports_timeout() {
        let pending = std::future::pending::<RpcResult<()>>();
        let err = bounded("weights", Duration::from_millis(10), pending)
            .await
            .unwrap_err();

        assert!(matches!(err, RpcErr::Timeout { what: "weights", .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn bounded_wait_passes_through_the_reply() {
        let ready = async { Ok::<_, RpcErr>(7) };
        assert_eq!(bounded("n", Duration::from_secs(1), ready).await, Ok(7));
    }

    #[test]
    fn shape_mismatch_is_not_retryable() {
        assert!(!RpcErr::ShapeMismatch("layer 0".into()).is_retryable());
        assert!(!RpcErr::Protocol("bad".into()).is_retryable());
    }
}
