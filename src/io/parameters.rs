//! JSON simulation parameter files.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};

use crate::sim::hybrid::SimulationParameters;

/// Reads parameters from a JSON file. Missing fields take their defaults;
/// the result is validated.
pub fn read_parameters(path: &Path) -> Result<SimulationParameters> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let reader = BufReader::new(file);

    let params: SimulationParameters = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to deserialize parameters from: {}", path.display()))?;
    params
        .validate()
        .with_context(|| format!("Invalid parameters in: {}", path.display()))?;

    Ok(params)
}

pub fn write_parameters(path: &Path, params: &SimulationParameters) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, params)
        .with_context(|| format!("Failed to serialize parameters to: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_and_read_parameters() {
        let mut params = SimulationParameters::new();
        params.seed = 99;
        params.duration = Some(1.5);
        params.waveguide.cutoff = 250.0;
        let file = NamedTempFile::new().unwrap();

        write_parameters(file.path(), &params).unwrap();
        let loaded = read_parameters(file.path()).unwrap();
        assert_eq!(loaded, params);
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "rays": {{ "max_image_source_order": 9 }} }}"#).unwrap();

        let err = read_parameters(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ImageSourceOrder { order: 9, .. })
        ));
    }
}
