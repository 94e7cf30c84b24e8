use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::Path;

use crate::errors::Result;
use crate::external_tools::ExternalTools;
use crate::table::Table;
use tempfile::Builder;

pub fn write_tsv_line<W: Write + ?Sized>(writer: &mut W, fields: &[String]) -> Result<()> {
    writer.write_all(fields.join("\t").as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Runs `write_fn` against stdout for `-`, a bgzip-compressed file for
/// `*.gz`, or a plain file otherwise.
pub fn with_text_output_writer<F>(path: &str, tools: &ExternalTools, write_fn: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    if path == "-" {
        let mut out = stdout().lock();
        write_fn(&mut out)?;
        out.flush()?;
        return Ok(());
    }

    if path.ends_with(".gz") {
        let output_path = Path::new(path);
        let parent_dir = output_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut plain_file = Builder::new()
            .prefix("sanpro_")
            .suffix(".tmp_plain")
            .tempfile_in(parent_dir)?;

        {
            let mut buf = BufWriter::new(plain_file.as_file_mut());
            write_fn(&mut buf)?;
            buf.flush()?;
        }

        tools.bgzip_compress_to(plain_file.path(), output_path)?;
        return Ok(());
    }

    let mut file = BufWriter::new(File::create(path)?);
    write_fn(&mut file)?;
    file.flush()?;
    Ok(())
}

pub fn write_table(path: &str, table: &Table, tools: &ExternalTools) -> Result<()> {
    with_text_output_writer(path, tools, |out| table.write_to(out))
}

pub fn write_rows(
    path: &str,
    header: &[String],
    rows: &[Vec<String>],
    tools: &ExternalTools,
) -> Result<()> {
    with_text_output_writer(path, tools, |out| {
        write_tsv_line(out, header)?;
        for row in rows {
            write_tsv_line(out, row)?;
        }
        Ok(())
    })
}
