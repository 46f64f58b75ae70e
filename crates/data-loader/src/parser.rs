//! Parser for the book-review data files.
//!
//! All files use `::` as the field separator:
//! - users.dat: userId::name
//! - books.dat: bookId::title::author::published
//! - reviews.dat: userId::bookId::rating[::timestamp]

use crate::error::{DataLoadError, Result};
use crate::types::*;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::{FromStr, Split};

/// Read a file encoded as ISO-8859-1 (Latin-1).
///
/// Every byte maps directly to the Unicode code point of the same value, so
/// the conversion never fails.
fn read_lines_latin1(path: &Path) -> Result<Vec<String>> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DataLoadError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => DataLoadError::IoError(e),
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let content: String = bytes.iter().map(|&b| b as char).collect();

    Ok(content.lines().map(|s| s.to_string()).collect())
}

/// One line of a `::` separated file, with enough context for error messages.
struct Fields<'a> {
    file: &'static str,
    line: usize,
    parts: Split<'a, &'static str>,
}

impl<'a> Fields<'a> {
    fn new(file: &'static str, line: usize, text: &'a str) -> Self {
        Self {
            file,
            line,
            parts: text.split("::"),
        }
    }

    fn error(&self, reason: String) -> DataLoadError {
        DataLoadError::ParseError {
            file: self.file.to_string(),
            line: self.line,
            reason,
        }
    }

    fn next_str(&mut self, name: &str) -> Result<&'a str> {
        match self.parts.next() {
            Some(value) => Ok(value),
            None => Err(self.error(format!("Missing {}", name))),
        }
    }

    fn next_parsed<T>(&mut self, name: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.next_str(name)?;
        raw.trim()
            .parse()
            .map_err(|e| self.error(format!("Invalid {}: {}", name, e)))
    }

    /// An optional trailing field: absent or blank yields `None`.
    fn next_optional<T>(&mut self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.parts.next().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| self.error(format!("Invalid {}: {}", name, e))),
        }
    }
}

/// Iterate over the non-blank lines of a file with 1-based line numbers.
fn records(lines: &[String]) -> impl Iterator<Item = (usize, &str)> {
    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

/// Parse the users.dat file
///
/// Format: userId::name
pub fn parse_users(path: &Path) -> Result<Vec<User>> {
    let lines = read_lines_latin1(path)?;
    let mut users = Vec::new();

    for (line_no, line) in records(&lines) {
        let mut fields = Fields::new("users.dat", line_no, line);
        let id = fields.next_parsed("userId")?;
        let name = fields.next_str("name")?.trim().to_string();

        users.push(User { id, name });
    }

    Ok(users)
}

/// Parse the books.dat file
///
/// Format: bookId::title::author::published
///
/// Author and publication year may be left empty.
pub fn parse_books(path: &Path) -> Result<Vec<Book>> {
    let lines = read_lines_latin1(path)?;
    let mut books = Vec::new();

    for (line_no, line) in records(&lines) {
        let mut fields = Fields::new("books.dat", line_no, line);
        let id = fields.next_parsed("bookId")?;
        let title = fields.next_str("title")?.trim().to_string();
        let author = fields.next_optional::<String>("author")?;
        let published = fields.next_optional("published")?;

        books.push(Book {
            id,
            title,
            author,
            published,
        });
    }

    Ok(books)
}

/// Parse the reviews.dat file
///
/// Format: userId::bookId::rating[::timestamp]
pub fn parse_reviews(path: &Path) -> Result<Vec<Review>> {
    let lines = read_lines_latin1(path)?;
    let mut reviews = Vec::new();

    for (line_no, line) in records(&lines) {
        let mut fields = Fields::new("reviews.dat", line_no, line);
        let user_id = fields.next_parsed("userId")?;
        let book_id = fields.next_parsed("bookId")?;
        let rating = fields.next_parsed("rating")?;
        let timestamp = fields.next_optional("timestamp")?;

        reviews.push(Review {
            user_id,
            book_id,
            rating,
            timestamp,
        });
    }

    Ok(reviews)
}
