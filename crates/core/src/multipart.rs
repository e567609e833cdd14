//! multipart/form-data encoding for file uploads
//!
//! Produces one body holding the form fields in caller order, followed by a
//! single file part. The boundary is a fixed token unlikely to occur in
//! uploaded content.

use bytes::{BufMut, Bytes, BytesMut};

/// Boundary separating the parts
pub const BOUNDARY: &str = "----------ThE_fIlE_bOuNdArY_stcrest";

/// Form field name of the file part
pub const FILE_FIELD: &str = "file";

const CRLF: &[u8] = b"\r\n";

/// A multipart body under construction
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    fields: Vec<(String, String)>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text field; fields are written in insertion order
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }

    /// Encode the fields plus the file content as one body
    pub fn encode(&self, file_name: &str, content: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(content.len() + 256 + self.fields.len() * 96);

        for (name, value) in &self.fields {
            put_line(&mut buf, format!("--{BOUNDARY}").as_bytes());
            put_line(
                &mut buf,
                format!("Content-Disposition: form-data; name=\"{name}\"").as_bytes(),
            );
            put_line(&mut buf, b"");
            put_line(&mut buf, value.as_bytes());
        }

        put_line(&mut buf, format!("--{BOUNDARY}").as_bytes());
        put_line(
            &mut buf,
            format!("Content-Disposition: form-data; name=\"{FILE_FIELD}\"; filename=\"{file_name}\"")
                .as_bytes(),
        );
        put_line(&mut buf, b"Content-Type: application/octet-stream");
        put_line(&mut buf, b"");
        put_line(&mut buf, content);
        buf.put_slice(format!("--{BOUNDARY}--").as_bytes());
        buf.put_slice(CRLF);

        buf.freeze()
    }
}

fn put_line(buf: &mut BytesMut, line: &[u8]) {
    buf.put_slice(line);
    buf.put_slice(CRLF);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_precede_file_in_order() {
        let body = MultipartForm::new()
            .field("b", "2")
            .field("a", "1")
            .encode("cfg.xml", b"<xml/>");
        let text = String::from_utf8(body.to_vec()).unwrap();

        let b = text.find("name=\"b\"").unwrap();
        let a = text.find("name=\"a\"").unwrap();
        let file = text.find("name=\"file\"; filename=\"cfg.xml\"").unwrap();
        assert!(b < a && a < file);
        assert!(text.ends_with(&format!("--{BOUNDARY}--\r\n")));
    }

    #[test]
    fn test_exact_layout_without_fields() {
        let body = MultipartForm::new().encode("x.bin", b"abc");
        let expected = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"x.bin\"\r\n\
             Content-Type: application/octet-stream\r\n\
             \r\n\
             abc\r\n\
             --{BOUNDARY}--\r\n"
        );
        assert_eq!(body, Bytes::from(expected));
    }

    #[test]
    fn test_binary_content_kept_verbatim() {
        let content: Vec<u8> = (0..=255u8).collect();
        let body = MultipartForm::new().encode("blob", &content);
        assert!(body.windows(content.len()).any(|w| w == content.as_slice()));
    }

    #[test]
    fn test_content_type_names_boundary() {
        assert_eq!(
            MultipartForm::content_type(),
            format!("multipart/form-data; boundary={BOUNDARY}")
        );
    }
}
