//! Built-in handler bodies for the default message handler, grounded on the
//! source's `message_utils.cc` (`GetFileSize`, `DownloadFile`).

use std::path::Path;

use dive_proto::{Message, Result};
use dive_transport::Connection;

use crate::framing::send_message;

/// `FileSizeRequest` handler: stat the path and report size or absence.
pub fn file_size(conn: &Connection, path: &str) -> Result<()> {
    let response = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Message::FileSizeResponse {
            found: true,
            error_reason: String::new(),
            file_size_str: meta.len().to_string(),
        },
        Ok(_) => Message::FileSizeResponse {
            found: false,
            error_reason: format!("{path} is not a regular file"),
            file_size_str: String::new(),
        },
        Err(e) => Message::FileSizeResponse {
            found: false,
            error_reason: e.to_string(),
            file_size_str: String::new(),
        },
    };
    send_message(conn, &response)
}

/// `DownloadFileRequest` handler: stat the path, reply, then stream the
/// file body if found.
pub fn download_file(conn: &Connection, path: &str) -> Result<()> {
    let meta = std::fs::metadata(path);
    match meta {
        Ok(meta) if meta.is_file() => {
            send_message(
                conn,
                &Message::DownloadFileResponse {
                    found: true,
                    error_reason: String::new(),
                    file_path: path.to_string(),
                    file_size_str: meta.len().to_string(),
                },
            )?;
            conn.send_file(Path::new(path))
        }
        Ok(_) => send_message(
            conn,
            &Message::DownloadFileResponse {
                found: false,
                error_reason: format!("{path} is not a regular file"),
                file_path: String::new(),
                file_size_str: String::new(),
            },
        ),
        Err(e) => send_message(
            conn,
            &Message::DownloadFileResponse {
                found: false,
                error_reason: e.to_string(),
                file_path: String::new(),
                file_size_str: String::new(),
            },
        ),
    }
}

/// Deletes a file on device. Not wired to any [`dive_proto::MessageType`] —
/// embedders with a custom handler may call this from their own extension
/// message type (see the workspace design notes for why this stays off the
/// wire protocol).
pub fn remove_file(path: &str) -> Result<()> {
    std::fs::remove_file(path).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::receive_message;
    use dive_transport::Connection;
    use std::io::Write;

    #[test]
    fn file_size_reports_length_for_existing_file() {
        let dir = std::env::temp_dir().join(format!("dive-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("a.txt");
        std::fs::File::create(&path).unwrap().write_all(b"1234567").unwrap();

        let (server, client) = Connection::mem_pair();
        file_size(&server, path.to_str().unwrap()).unwrap();
        let response = receive_message(&client, 1_000).unwrap();
        assert_eq!(
            response,
            Message::FileSizeResponse {
                found: true,
                error_reason: String::new(),
                file_size_str: "7".to_string(),
            }
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn file_size_reports_not_found_for_missing_file() {
        let (server, client) = Connection::mem_pair();
        file_size(&server, "/nonexistent/path/for/dive/tests").unwrap();
        let response = receive_message(&client, 1_000).unwrap();
        match response {
            Message::FileSizeResponse { found, .. } => assert!(!found),
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
