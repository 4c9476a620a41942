use anyhow::Result;
use arrow::csv::Writer as CsvWriter;
use arrow::json::LineDelimitedWriter;
use arrow::util::pretty::pretty_format_batches;
use skylark_client::Table;

pub fn print_table(table: &Table) -> Result<()> {
    println!("{}", pretty_format_batches(table.batches())?);
    Ok(())
}

pub fn print_json(table: &Table) -> Result<()> {
    let mut writer = LineDelimitedWriter::new(std::io::stdout());
    for batch in table.batches() {
        writer.write(batch)?;
    }
    writer.finish()?;
    Ok(())
}

pub fn print_csv(table: &Table) -> Result<()> {
    let mut writer = CsvWriter::new(std::io::stdout());
    for batch in table.batches() {
        writer.write(batch)?;
    }
    Ok(())
}
