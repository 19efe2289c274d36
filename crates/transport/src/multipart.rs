//! Multipart file uploads.

use convergence::{CancellationToken, TransportError};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::client::Client;
use crate::echo::{curl_multipart, FormEntry};
use crate::request::Reply;

/// Form field used for file parts when none is given.
pub const DEFAULT_FILE_FIELD: &str = "file";

/// Form field carrying a file's destination path.
pub const FILE_PATH_FIELD: &str = "filePath";

/// One file in a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Name reported to the server.
    pub file_name: String,
    pub content: Vec<u8>,
    /// Form field of the part; [`DEFAULT_FILE_FIELD`] when `None`.
    pub form_field: Option<String>,
    /// Destination path inside the remote object, sent as [`FILE_PATH_FIELD`].
    pub path_in_model: Option<String>,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
            form_field: None,
            path_in_model: None,
        }
    }

    pub fn with_form_field(mut self, field: impl Into<String>) -> Self {
        self.form_field = Some(field.into());
        self
    }

    pub fn with_path_in_model(mut self, path: impl Into<String>) -> Self {
        self.path_in_model = Some(path.into());
        self
    }

    fn field(&self) -> &str {
        self.form_field.as_deref().unwrap_or(DEFAULT_FILE_FIELD)
    }
}

impl Client {
    /// Uploads `files` together with plain `fields` as `multipart/form-data`.
    ///
    /// Fields are written first, then each file followed by its `filePath`
    /// field when it has one. The reply is classified exactly like a JSON call.
    #[instrument(skip_all, fields(method = %method, path = path, files = files.len()))]
    pub async fn upload<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        files: &[FilePart],
        fields: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<Reply<T>, TransportError> {
        let url = self.url(path, &[])?;
        let headers = self.standard_headers(None)?;

        let mut form = Form::new();
        let mut entries: Vec<FormEntry<'_>> = Vec::with_capacity(fields.len() + files.len() * 2);
        for (name, value) in fields {
            form = form.text(name.clone(), value.clone());
            entries.push(FormEntry::Text { name, value });
        }
        for file in files {
            let part = Part::bytes(file.content.clone()).file_name(file.file_name.clone());
            form = form.part(file.field().to_string(), part);
            entries.push(FormEntry::File {
                field: file.field(),
                file_name: &file.file_name,
            });
            if let Some(file_path) = &file.path_in_model {
                form = form.text(FILE_PATH_FIELD, file_path.clone());
                entries.push(FormEntry::Text {
                    name: FILE_PATH_FIELD,
                    value: file_path,
                });
            }
        }

        let echo = self
            .config()
            .debug()
            .then(|| curl_multipart(&method, &url, &headers, &entries));

        let request = self
            .http()
            .request(method.clone(), url.clone())
            .headers(headers)
            .multipart(form);
        self.send(&method, &url, request, echo, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_field_defaults_to_file() {
        let part = FilePart::new("model.py", b"print(1)".to_vec());
        assert_eq!(part.field(), "file");
        assert_eq!(part.with_form_field("archive").field(), "archive");
    }
}
