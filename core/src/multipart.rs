//! multipart/form-data framing.
//!
//! # Design
//! The body is described once, by [`chunks`], as an ordered list of framing
//! pieces. [`content_length`] sums that list, [`write_body`] copies it to a
//! writer and [`MultipartBody::into_reader`] streams it, so the advertised
//! length and the bytes on the wire can never disagree. The closing
//! `--{boundary}--` line is emitted once, after the last field.

use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{self, Cursor, Read, Take, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::error::Error;

const CRLF: &[u8] = b"\r\n";

/// A numeric field value, written with its natural decimal form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Int(v) => write!(f, "{v}"),
            Numeric::Float(v) => write!(f, "{v}"),
        }
    }
}

/// A file on disk, measured when the field is created.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    path: PathBuf,
    len: u64,
    filename: String,
    content_type: String,
}

impl FilePart {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

/// One value of a form.
#[derive(Debug, Clone, PartialEq)]
pub enum FormField {
    Text(String),
    Number(Numeric),
    File(FilePart),
    Bytes(Vec<u8>),
}

impl FormField {
    /// Build a file field, recording the file's length and guessing its MIME type.
    pub fn file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path).map_err(|source| Error::InvalidFile {
            path: path.to_path_buf(),
            source,
        })?;
        if !meta.is_file() {
            return Err(Error::InvalidFile {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            });
        }
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(FormField::File(FilePart {
            path: path.to_path_buf(),
            len: meta.len(),
            filename,
            content_type,
        }))
    }

    /// Convert a dynamically typed value. Only strings and numbers are accepted.
    pub fn from_json(field: &str, value: serde_json::Value) -> Result<Self, Error> {
        use serde_json::Value;

        let type_name = match value {
            Value::String(s) => return Ok(FormField::Text(s)),
            Value::Number(n) => {
                let numeric = match (n.as_i64(), n.as_f64()) {
                    (Some(i), _) => Numeric::Int(i),
                    (None, Some(f)) => Numeric::Float(f),
                    (None, None) => return Ok(FormField::Text(n.to_string())),
                };
                return Ok(FormField::Number(numeric));
            }
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        };
        Err(Error::UnsupportedFieldType {
            field: field.to_string(),
            type_name: type_name.to_string(),
        })
    }
}

impl From<&str> for FormField {
    fn from(value: &str) -> Self {
        FormField::Text(value.to_string())
    }
}

impl From<String> for FormField {
    fn from(value: String) -> Self {
        FormField::Text(value)
    }
}

impl From<i64> for FormField {
    fn from(value: i64) -> Self {
        FormField::Number(Numeric::Int(value))
    }
}

impl From<i32> for FormField {
    fn from(value: i32) -> Self {
        FormField::Number(Numeric::Int(value.into()))
    }
}

impl From<f64> for FormField {
    fn from(value: f64) -> Self {
        FormField::Number(Numeric::Float(value))
    }
}

impl From<Vec<u8>> for FormField {
    fn from(value: Vec<u8>) -> Self {
        FormField::Bytes(value)
    }
}

impl From<&[u8]> for FormField {
    fn from(value: &[u8]) -> Self {
        FormField::Bytes(value.to_vec())
    }
}

/// Named form fields in insertion order. Names are unique; inserting an
/// existing name replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Form {
    fields: Vec<(String, FormField)>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, field: impl Into<FormField>) -> &mut Self {
        let name = name.into();
        let field = field.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = field,
            None => self.fields.push((name, field)),
        }
        self
    }

    /// Chainable form of [`Form::insert`].
    pub fn with(mut self, name: impl Into<String>, field: impl Into<FormField>) -> Self {
        self.insert(name, field);
        self
    }

    /// Insert a dynamically typed value, rejecting anything but strings and numbers.
    pub fn insert_json(&mut self, name: impl Into<String>, value: serde_json::Value) -> Result<&mut Self, Error> {
        let name = name.into();
        let field = FormField::from_json(&name, value)?;
        Ok(self.insert(name, field))
    }

    pub fn get(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormField)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }
}

/// The delimiter of one multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary(String);

impl Boundary {
    /// A fresh boundary: the current time in milliseconds followed by random hex.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let random = Uuid::new_v4().simple().to_string();
        Boundary(format!("----SlardarFormBoundary{millis:x}{}", &random[..16]))
    }

    /// Use a caller-chosen boundary. Mostly useful for reproducible output.
    pub fn from_string(value: impl Into<String>) -> Self {
        Boundary(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One framing piece of the body.
#[derive(Debug)]
enum Chunk<'a> {
    Data(Cow<'a, [u8]>),
    File(&'a FilePart),
}

impl Chunk<'_> {
    fn len(&self) -> u64 {
        match self {
            Chunk::Data(data) => data.len() as u64,
            Chunk::File(file) => file.len,
        }
    }
}

/// Synthesized filename for a byte-buffer field: the field name plus a
/// digest of the content.
pub fn bytes_filename(name: &str, data: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{name}{:016x}", hasher.finish())
}

// Quotes and line breaks would end the quoted-string early.
fn escape_quoted(value: &str) -> Cow<'_, str> {
    if !value.contains(['"', '\r', '\n']) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .replace('"', "%22")
            .replace('\r', "%0D")
            .replace('\n', "%0A"),
    )
}

fn text_header(boundary: &Boundary, name: &str) -> Vec<u8> {
    format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"{}\"\r\n\
         Content-Type: text/plain; charset=UTF-8\r\n\
         Content-Transfer-Encoding: 8bit\r\n\r\n",
        escape_quoted(name)
    )
    .into_bytes()
}

fn binary_header(boundary: &Boundary, name: &str, filename: &str, content_type: &str) -> Vec<u8> {
    format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
         Content-Type: {content_type}\r\n\
         Content-Transfer-Encoding: binary\r\n\r\n",
        escape_quoted(name),
        escape_quoted(filename)
    )
    .into_bytes()
}

/// The whole body as an ordered list of pieces. Every consumer goes through here.
fn chunks<'a>(form: &'a Form, boundary: &Boundary) -> Vec<Chunk<'a>> {
    let mut out = Vec::with_capacity(form.len() * 3 + 1);
    if form.is_empty() {
        return out;
    }
    for (name, field) in form.iter() {
        match field {
            FormField::Text(value) => {
                out.push(Chunk::Data(text_header(boundary, name).into()));
                out.push(Chunk::Data(Cow::Borrowed(value.as_bytes())));
            }
            FormField::Number(value) => {
                out.push(Chunk::Data(text_header(boundary, name).into()));
                out.push(Chunk::Data(value.to_string().into_bytes().into()));
            }
            FormField::File(file) => {
                out.push(Chunk::Data(
                    binary_header(boundary, name, &file.filename, &file.content_type).into(),
                ));
                out.push(Chunk::File(file));
            }
            FormField::Bytes(data) => {
                let filename = bytes_filename(name, data);
                out.push(Chunk::Data(
                    binary_header(boundary, name, &filename, "application/octet-stream").into(),
                ));
                out.push(Chunk::Data(Cow::Borrowed(data.as_slice())));
            }
        }
        out.push(Chunk::Data(Cow::Borrowed(CRLF)));
    }
    out.push(Chunk::Data(format!("--{boundary}--\r\n").into_bytes().into()));
    out
}

/// Exact number of bytes [`write_body`] will produce for the same inputs.
pub fn content_length(form: &Form, boundary: &Boundary) -> u64 {
    chunks(form, boundary).iter().map(Chunk::len).sum()
}

/// Write the body, returning the number of bytes written.
///
/// Fails if a file no longer has the length it had when its field was built.
pub fn write_body<W: Write>(out: &mut W, form: &Form, boundary: &Boundary) -> io::Result<u64> {
    let mut written = 0;
    for chunk in chunks(form, boundary) {
        match chunk {
            Chunk::Data(data) => {
                out.write_all(&data)?;
                written += data.len() as u64;
            }
            Chunk::File(file) => {
                let copied = io::copy(&mut File::open(&file.path)?.take(file.len), out)?;
                if copied != file.len {
                    return Err(file_shrank(file));
                }
                written += copied;
            }
        }
    }
    Ok(written)
}

fn file_shrank(file: &FilePart) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("{} is shorter than its recorded length {}", file.path.display(), file.len),
    )
}

/// A form paired with its boundary and precomputed length.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    form: Form,
    boundary: Boundary,
    length: u64,
}

impl MultipartBody {
    pub fn new(form: Form, boundary: Boundary) -> Self {
        let length = content_length(&form, &boundary);
        Self {
            form,
            boundary,
            length,
        }
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<u64> {
        write_body(out, &self.form, &self.boundary)
    }

    /// A reader over the encoded body. Files are opened here, so a missing
    /// file fails before anything is sent.
    pub fn into_reader(self) -> io::Result<MultipartReader> {
        let mut segments = VecDeque::new();
        for chunk in chunks(&self.form, &self.boundary) {
            let segment = match chunk {
                Chunk::Data(data) => Segment::Data(Cursor::new(data.into_owned())),
                Chunk::File(file) => Segment::File {
                    reader: File::open(&file.path)?.take(file.len),
                    part: file.clone(),
                },
            };
            segments.push_back(segment);
        }
        Ok(MultipartReader { segments })
    }
}

enum Segment {
    Data(Cursor<Vec<u8>>),
    File { reader: Take<File>, part: FilePart },
}

/// Sequential reader produced by [`MultipartBody::into_reader`].
pub struct MultipartReader {
    segments: VecDeque<Segment>,
}

impl Read for MultipartReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while let Some(front) = self.segments.front_mut() {
            let n = match front {
                Segment::Data(cursor) => cursor.read(buf)?,
                Segment::File { reader, part } => {
                    let n = reader.read(buf)?;
                    if n == 0 && reader.limit() > 0 {
                        return Err(file_shrank(part));
                    }
                    n
                }
            };
            if n > 0 {
                return Ok(n);
            }
            self.segments.pop_front();
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn boundary() -> Boundary {
        Boundary::from_string("XyZ")
    }

    fn encode(form: &Form) -> Vec<u8> {
        let mut out = Vec::new();
        write_body(&mut out, form, &boundary()).unwrap();
        out
    }

    #[test]
    fn text_field_framing_is_exact() {
        let form = Form::new().with("name", "bob");
        let body = String::from_utf8(encode(&form)).unwrap();
        assert_eq!(
            body,
            "--XyZ\r\n\
             Content-Disposition: form-data; name=\"name\"\r\n\
             Content-Type: text/plain; charset=UTF-8\r\n\
             Content-Transfer-Encoding: 8bit\r\n\r\n\
             bob\r\n\
             --XyZ--\r\n"
        );
    }

    #[test]
    fn number_fields_use_decimal_text() {
        let form = Form::new().with("count", 42).with("ratio", 0.5);
        let body = String::from_utf8(encode(&form)).unwrap();
        assert!(body.contains("\r\n\r\n42\r\n"));
        assert!(body.contains("\r\n\r\n0.5\r\n"));
    }

    #[test]
    fn file_field_framing_is_exact() {
        let mut tmp = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        let field = FormField::file(tmp.path()).unwrap();
        let filename = match &field {
            FormField::File(part) => part.filename().to_string(),
            other => panic!("expected file field, got {other:?}"),
        };
        let form = Form::new().with("file", field);
        let body = String::from_utf8(encode(&form)).unwrap();
        assert_eq!(
            body,
            format!(
                "--XyZ\r\n\
                 Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                 Content-Type: text/plain\r\n\
                 Content-Transfer-Encoding: binary\r\n\r\n\
                 0123456789\r\n\
                 --XyZ--\r\n"
            )
        );
    }

    #[test]
    fn bytes_field_gets_synthesized_filename() {
        let form = Form::new().with("blob", vec![0u8, 1, 2, 255]);
        let body = encode(&form);
        let expected_name = bytes_filename("blob", &[0, 1, 2, 255]);
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains(&format!("filename=\"{expected_name}\"")));
        assert!(text.contains("Content-Type: application/octet-stream\r\n"));
        assert!(expected_name.starts_with("blob"));
        assert_ne!(expected_name, bytes_filename("blob", b"other"));
    }

    #[test]
    fn closing_boundary_appears_once_at_the_end() {
        let form = Form::new()
            .with("a", vec![1u8; 4])
            .with("b", "text")
            .with("c", vec![2u8; 3]);
        let body = encode(&form);
        let text = String::from_utf8_lossy(&body);
        assert_eq!(text.matches("--XyZ--").count(), 1);
        assert!(text.ends_with("--XyZ--\r\n"));
        assert_eq!(text.matches("--XyZ\r\n").count(), 3);
    }

    #[test]
    fn computed_length_matches_written_bytes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[7u8; 1000]).unwrap();
        let forms = vec![
            Form::new(),
            Form::new().with("name", "bob"),
            Form::new().with("name", "ünïcødé ✓").with("n", -17),
            Form::new()
                .with("file", FormField::file(tmp.path()).unwrap())
                .with("raw", vec![0u8; 333])
                .with("ratio", 1.75),
        ];
        for form in forms {
            assert_eq!(encode(&form).len() as u64, content_length(&form, &boundary()));
        }
    }

    #[test]
    fn reader_yields_the_written_bytes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"file contents").unwrap();
        let form = Form::new()
            .with("t", "x")
            .with("f", FormField::file(tmp.path()).unwrap());
        let expected = encode(&form);

        let body = MultipartBody::new(form, boundary());
        assert_eq!(body.len(), expected.len() as u64);
        let mut streamed = Vec::new();
        body.into_reader().unwrap().read_to_end(&mut streamed).unwrap();
        assert_eq!(streamed, expected);
    }

    #[test]
    fn shrunken_file_is_an_error_not_a_short_body() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        let form = Form::new().with("f", FormField::file(tmp.path()).unwrap());
        tmp.as_file().set_len(3).unwrap();

        let err = write_body(&mut Vec::new(), &form, &boundary()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let mut reader = MultipartBody::new(form, boundary()).into_reader().unwrap();
        let err = reader.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn empty_form_has_empty_body() {
        let form = Form::new();
        assert_eq!(content_length(&form, &boundary()), 0);
        assert!(encode(&form).is_empty());
    }

    #[test]
    fn insert_replaces_existing_name_in_place() {
        let mut form = Form::new();
        form.insert("a", "1").insert("b", "2").insert("a", "3");
        let names: Vec<&str> = form.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(form.get("a"), Some(&FormField::Text("3".to_string())));
    }

    #[test]
    fn json_values_outside_text_and_numbers_are_rejected() {
        let mut form = Form::new();
        form.insert_json("s", serde_json::json!("x")).unwrap();
        form.insert_json("n", serde_json::json!(12)).unwrap();
        form.insert_json("f", serde_json::json!(1.25)).unwrap();
        assert_eq!(form.get("n"), Some(&FormField::Number(Numeric::Int(12))));

        let err = form.insert_json("flag", serde_json::json!(true)).unwrap_err();
        match err {
            Error::UnsupportedFieldType { field, type_name } => {
                assert_eq!(field, "flag");
                assert_eq!(type_name, "boolean");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(form.insert_json("list", serde_json::json!([1])).is_err());
        assert_eq!(form.len(), 3);
    }

    #[test]
    fn missing_file_is_reported_with_its_path() {
        let err = FormField::file("/definitely/not/here.bin").unwrap_err();
        assert!(matches!(err, Error::InvalidFile { .. }));
        assert!(err.to_string().contains("/definitely/not/here.bin"));
    }

    #[test]
    fn quotes_in_names_are_escaped() {
        let form = Form::new().with("a\"b", "v");
        let text = String::from_utf8(encode(&form)).unwrap();
        assert!(text.contains("name=\"a%22b\""));
    }

    #[test]
    fn generated_boundaries_differ() {
        let a = Boundary::generate();
        let b = Boundary::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("----SlardarFormBoundary"));
    }
}
