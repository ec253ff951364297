//! Minimal CSV row reader.
//!
//! No quoting, no escapes: a line is split on `,`. A trailing comma with
//! nothing after it produces one additional empty field.

use std::io::BufRead;

pub struct CsvRow {
    fields: Vec<String>,
}

impl CsvRow {
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn parse(line: &str) -> CsvRow {
        // `str::split` already yields a trailing empty field when `line`
        // ends with `,` (unlike e.g. a C++ `getline`-on-delimiter loop,
        // which drops it), so no extra field needs to be appended here.
        let fields: Vec<String> = line.split(',').map(|s| s.to_string()).collect();
        CsvRow { fields }
    }
}

/// Iterates the rows of a CSV source, one per line. Partial trailing
/// lines without a final newline are still parsed, matching
/// `std::getline` end-of-stream behavior in the source.
pub struct CsvReader<R> {
    lines: std::io::Lines<R>,
}

impl<R: BufRead> CsvReader<R> {
    pub fn new(reader: R) -> Self {
        CsvReader {
            lines: reader.lines(),
        }
    }
}

impl<R: BufRead> Iterator for CsvReader<R> {
    type Item = std::io::Result<CsvRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lines.next() {
            None => None,
            Some(Err(e)) => Some(Err(e)),
            Some(Ok(line)) => Some(Ok(CsvRow::parse(&line))),
        }
    }
}
