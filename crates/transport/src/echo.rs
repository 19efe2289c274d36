//! Reproducible command lines for failed calls in debug mode.
//!
//! The credential is never echoed; the command references the environment
//! variable that normally holds it instead.

use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Method, Url};

use crate::config::API_KEY_ENV;

/// Renders ` (curl -X ... )` for a JSON request.
pub(crate) fn curl_command(method: &Method, url: &Url, headers: &HeaderMap, body: Option<&[u8]>) -> String {
    let mut command = format!("curl -X {method} '{url}'");
    push_headers(&mut command, headers);
    if let Some(body) = body {
        command.push_str(&format!(" -d '{}'", quote(&String::from_utf8_lossy(body))));
    }
    format!(" ({command})")
}

/// One multipart form entry, in the order it is written.
pub(crate) enum FormEntry<'a> {
    Text { name: &'a str, value: &'a str },
    File { field: &'a str, file_name: &'a str },
}

/// Renders ` (curl -X ... )` for a multipart upload; file contents become `@name`.
pub(crate) fn curl_multipart(method: &Method, url: &Url, headers: &HeaderMap, entries: &[FormEntry<'_>]) -> String {
    let mut command = format!("curl -X {method} '{url}'");
    push_headers(&mut command, headers);
    for entry in entries {
        match entry {
            FormEntry::Text { name, value } => {
                command.push_str(&format!(" -F '{}={}'", quote(name), quote(value)));
            }
            FormEntry::File { field, file_name } => {
                command.push_str(&format!(" -F '{}=@{}'", quote(field), quote(file_name)));
            }
        }
    }
    format!(" ({command})")
}

fn push_headers(command: &mut String, headers: &HeaderMap) {
    for (name, value) in headers {
        if *name == AUTHORIZATION {
            command.push_str(&format!(" -H \"Authorization: Bearer ${API_KEY_ENV}\""));
            continue;
        }
        let value = String::from_utf8_lossy(value.as_bytes());
        command.push_str(&format!(" -H '{}: {}'", name.as_str(), quote(&value)));
    }
}

/// Escapes text for use inside a single-quoted shell word.
fn quote(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderValue, ACCEPT};

    use super::*;

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        headers
    }

    #[test]
    fn json_command_hides_credential() {
        let url = Url::parse("https://example.test/api/v2/useCases/").unwrap();
        let command = curl_command(&Method::POST, &url, &headers(), Some(br#"{"name":"it's"}"#));
        assert!(command.starts_with(" (curl -X POST 'https://example.test/api/v2/useCases/'"));
        assert!(command.contains("-H 'accept: application/json'"));
        assert!(command.contains("$DATAROBOT_API_KEY"));
        assert!(!command.contains("s3cret"));
        assert!(command.contains(r#"-d '{"name":"it\'s"}'"#));
    }

    #[test]
    fn multipart_command_keeps_entry_order() {
        let url = Url::parse("https://example.test/api/v2/datasets/fromFile/").unwrap();
        let command = curl_multipart(
            &Method::POST,
            &url,
            &headers(),
            &[
                FormEntry::Text {
                    name: "categories",
                    value: "TRAINING",
                },
                FormEntry::File {
                    field: "file",
                    file_name: "data.csv",
                },
                FormEntry::Text {
                    name: "filePath",
                    value: "data/data.csv",
                },
            ],
        );
        let categories = command.find("-F 'categories=TRAINING'").unwrap();
        let file = command.find("-F 'file=@data.csv'").unwrap();
        let path = command.find("-F 'filePath=data/data.csv'").unwrap();
        assert!(categories < file && file < path);
        assert!(command.ends_with(')'));
    }
}
