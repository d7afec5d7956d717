//! Loading the firmware image and cutting it into send-ready records.
//!
//! The image is an Intel-HEX-style text file, but `hexpush` never parses it:
//! each line, terminator included, is an opaque record that the bootloader
//! validates on its side. All this module does is read the bytes and split
//! them on line boundaries.

use std::{fs, io};

use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Select};
use log::{debug, info};

use crate::channel::PushError;
use crate::Settings;

/// Image file used when no path was given on the command line.
const DEFAULT_IMAGE: &str = "firmware.hex";

/// Read the firmware image and split it into records.
///
/// When the configured path (or the default) cannot be opened, the `.hex`
/// files in the current working directory are offered for interactive
/// selection. An image with no records is a configuration error, reported
/// before any serial traffic happens.
pub(crate) fn load_records(settings: &Settings) -> Result<Vec<Vec<u8>>, PushError> {
    let image_path = match &settings.hex_image {
        Some(value) => value.clone(),
        None => DEFAULT_IMAGE.into(),
    };

    let mut read_result = fs::read(&image_path);
    if let Err(e) = read_result {
        debug!("`{}` error: {}", &image_path, e);
        debug!("Looking for an image file in current directory");

        loop {
            match select_image_file_interactive() {
                Some(ref name) => {
                    if name.ends_with("cancel and go back...") {
                        return Err(PushError::Image(io::Error::new(
                            io::ErrorKind::NotFound,
                            "no firmware image was selected",
                        )));
                    }
                    read_result = fs::read(name);
                    if let Err(ref e) = read_result {
                        debug!("`{}` error: {}", name, e);
                        println!(
                            "{}",
                            style(format!("[HP] 🙁 could not open `{}`, try again...", name))
                                .yellow()
                        );
                    } else {
                        break;
                    }
                }
                None => {
                    debug!("No firmware image file was selected!");
                    // Try again with a refreshed list of files
                }
            }
        }
    }

    let bytes = read_result.map_err(PushError::Image)?;
    let records = split_records(&bytes);
    if records.is_empty() {
        return Err(PushError::EmptyImage);
    }
    Ok(records)
}

/// Split raw image bytes into records on `\n`, keeping each record's original
/// terminator. A final fragment without a terminator is still a record; the
/// bootloader treats `\r` as end-of-record so `\r\n` lines work unchanged.
fn split_records(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut records = Vec::new();
    let mut start = 0;
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'\n' {
            records.push(bytes[start..=i].to_vec());
            start = i + 1;
        }
    }
    if start < bytes.len() {
        records.push(bytes[start..].to_vec());
    }
    records
}

fn select_image_file_interactive() -> Option<String> {
    // List files ending with ".hex" in the current working directory and
    // ask the user to select one out of them.
    match fs::read_dir(".") {
        Ok(files) => {
            let mut items: Vec<String> = Vec::new();
            files
                .filter_map(Result::ok)
                .filter(|f| f.path().extension().unwrap_or_default() == "hex")
                .for_each(|f| {
                    let name = f.file_name();
                    items.push(name.to_str().unwrap().into());
                });

            if items.is_empty() {
                debug!("There are no image files in the current directory");
            }

            items.push("🔙cancel and go back...".into());

            let selection = Select::with_theme(&ColorfulTheme::default())
                .items(&items)
                .with_prompt(format!(
                    "Select a firmware image file to push (`{}` to refresh):",
                    style("Esc").cyan()
                ))
                .default(0)
                .interact_on_opt(&Term::stdout());

            match selection {
                Ok(Some(index)) => Some(items[index].clone()),
                Ok(None) => {
                    debug!("user did not select any firmware image file");
                    None
                }
                Err(ref e) => {
                    info!("error: {}", e.to_string());
                    None
                }
            }
        }
        Err(ref e) => {
            info!("error: {}", e.to_string());
            None
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::split_records;

    #[test]
    fn terminators_are_preserved() {
        let records = split_records(b":00000001FF\r\n:020000041000EA\r\n");
        assert_eq!(
            records,
            vec![
                b":00000001FF\r\n".to_vec(),
                b":020000041000EA\r\n".to_vec(),
            ]
        );
    }

    #[test]
    fn final_unterminated_fragment_is_a_record() {
        let records = split_records(b"L1\nL2");
        assert_eq!(records, vec![b"L1\n".to_vec(), b"L2".to_vec()]);
    }

    #[test]
    fn empty_input_yields_no_records() {
        assert!(split_records(b"").is_empty());
    }

    #[test]
    fn blank_lines_are_kept_verbatim() {
        let records = split_records(b"L1\n\nL2\n");
        assert_eq!(
            records,
            vec![b"L1\n".to_vec(), b"\n".to_vec(), b"L2\n".to_vec()]
        );
    }
}
