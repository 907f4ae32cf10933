use std::io::Read;

use bytes::Bytes;
use reqwest::blocking::multipart;

use crate::connector::error::TransportError;

/// One field of a multipart/form-data body.
#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    pub name: String,
    pub value: FormValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File {
        contents: Bytes,
        file_name: String,
        mime_type: String,
    },
}

impl Form {
    pub fn text<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: FormValue::Text(value.into()),
        }
    }

    pub fn file<N, C, F, M>(name: N, contents: C, file_name: F, mime_type: M) -> Self
    where
        N: Into<String>,
        C: Into<Bytes>,
        F: Into<String>,
        M: Into<String>,
    {
        Self {
            name: name.into(),
            value: FormValue::File {
                contents: contents.into(),
                file_name: file_name.into(),
                mime_type: mime_type.into(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EncodedForm {
    pub(crate) content_type: String,
    pub(crate) body: Bytes,
}

/// Encodes the fields with reqwest's multipart writer. Every call gets a fresh random boundary.
pub(crate) fn encode_multipart(forms: &[Form]) -> Result<EncodedForm, TransportError> {
    let mut multipart = multipart::Form::new();

    for form in forms {
        multipart = match &form.value {
            FormValue::Text(value) => multipart.text(form.name.clone(), value.clone()),
            FormValue::File {
                contents,
                file_name,
                mime_type,
            } => {
                let part = multipart::Part::bytes(contents.to_vec())
                    .file_name(file_name.clone())
                    .mime_str(mime_type)
                    .map_err(|err| {
                        TransportError::InvalidForm(format!(
                            "field `{}` has invalid mime type `{}`: {err}",
                            form.name,
                            mime_type.escape_debug()
                        ))
                    })?;
                multipart.part(form.name.clone(), part)
            }
        };
    }

    let content_type = format!("multipart/form-data; boundary={}", multipart.boundary());
    let mut body = Vec::new();
    multipart
        .into_reader()
        .read_to_end(&mut body)
        .map_err(|err| TransportError::InvalidForm(err.to_string()))?;

    Ok(EncodedForm {
        content_type,
        body: Bytes::from(body),
    })
}
