//! Delimited-text dialect of the staged object
//!
//! One record per line terminated by `\n`, no header. A field is quoted only
//! when it contains the delimiter, a quote, or a line terminator; embedded
//! quotes are doubled.

use crate::destination::Delimiter;
use crate::table::Row;
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use eyre::{Context, Result};
use std::io::{Read, Write};

/// Writer configured for the staging dialect
pub fn writer<W: Write>(delimiter: Delimiter, sink: W) -> csv::Writer<W> {
    WriterBuilder::new()
        .delimiter(delimiter.as_byte())
        .quote(b'"')
        .double_quote(true)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .has_headers(false)
        .from_writer(sink)
}

/// Write one row as a record
pub fn write_row<W: Write>(writer: &mut csv::Writer<W>, row: &Row) -> csv::Result<()> {
    writer.write_record(row.texts())
}

/// Parse staged bytes back into records with the same dialect
pub fn read_records<R: Read>(delimiter: Delimiter, source: R) -> Result<Vec<Vec<String>>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter.as_byte())
        .quote(b'"')
        .double_quote(true)
        .has_headers(false)
        .flexible(true)
        .from_reader(source);

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .with_context(|| "Failed to parse staged record")
        })
        .collect()
}
