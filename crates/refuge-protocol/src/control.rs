//! Local control channel.
//!
//! The daemon listens on a Unix socket for one-shot notices from local
//! processes (the power-outage worker, the `refuge notify` command). A
//! notice is the raw text written in one go, followed by a shutdown of the
//! write half. There is no reply.

use std::io;
use std::path::Path;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

/// Default path of the daemon's control socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/refuge.sock";

/// Environment variable overriding the control socket path.
pub const SOCKET_ENV: &str = "REFUGE_SOCKET";

/// Sends `text` as one notice to the control socket at `socket`.
pub async fn send_control(socket: &Path, text: &str) -> io::Result<()> {
    let mut stream = UnixStream::connect(socket).await?;
    stream.write_all(text.as_bytes()).await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_send_control_delivers_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refuge.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let reader = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut text = String::new();
            stream.read_to_string(&mut text).await.unwrap();
            text
        });

        send_control(&path, "Generator test").await.unwrap();
        assert_eq!(reader.await.unwrap(), "Generator test");
    }

    #[tokio::test]
    async fn test_send_control_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let err = send_control(&dir.path().join("absent.sock"), "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
