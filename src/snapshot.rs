use std::path;

use super::cli_utils;
use super::dataset::PreparedDataset;

pub fn load_snapshot(input_path: &path::Path) -> Result<PreparedDataset, bincode::Error> {
    let progress_bar = cli_utils::create_spinner(false, "Loading snapshot...");

    let file_reader = std::fs::File::open(input_path)?;
    let buf_reader = std::io::BufReader::new(file_reader);
    let result = bincode::deserialize_from(buf_reader);

    progress_bar.finish_and_clear();
    result
}

pub fn save_snapshot(dataset: &PreparedDataset, output_file: &path::Path) -> Result<(), bincode::Error> {
    let file_writer = std::fs::File::create(output_file)?;
    let buf_writer = std::io::BufWriter::new(file_writer);
    bincode::serialize_into(buf_writer, dataset)
}
