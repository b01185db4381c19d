//! Découverte des périphériques audio
//!
//! Recherche des périphériques par nom (tel qu'il apparaît dans les réglages)
//! et choix d'un format de stream compatible avec le codec.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};

use crate::{AudioConfig, AudioError, AudioResult};

/// Description d'un périphérique pour l'affichage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
}

/// Liste des périphériques disponibles sur l'hôte audio par défaut
#[derive(Debug, Clone, Default)]
pub struct DeviceList {
    pub inputs: Vec<DeviceInfo>,
    pub outputs: Vec<DeviceInfo>,
}

/// Nom lisible d'un périphérique cpal
pub fn device_name(device: &Device) -> String {
    device
        .description()
        .ok()
        .map(|desc| desc.name().to_string())
        .unwrap_or_else(|| "Périphérique inconnu".to_string())
}

/// Un nom configuré désigne un périphérique s'il est égal à son nom
/// ou s'il en est une sous-chaîne (sans tenir compte de la casse)
fn name_matches(configured: &str, actual: &str) -> bool {
    actual == configured || actual.to_lowercase().contains(&configured.to_lowercase())
}

/// Trouve le périphérique d'entrée correspondant au nom configuré
pub fn find_input_device(name: &str) -> AudioResult<Device> {
    let host = cpal::default_host();

    if AudioConfig::is_default_device(name) {
        return host.default_input_device().ok_or(AudioError::NoDeviceFound);
    }

    host.input_devices()?
        .find(|device| name_matches(name, &device_name(device)))
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

/// Trouve le périphérique de sortie correspondant au nom configuré
pub fn find_output_device(name: &str) -> AudioResult<Device> {
    let host = cpal::default_host();

    if AudioConfig::is_default_device(name) {
        return host.default_output_device().ok_or(AudioError::NoDeviceFound);
    }

    host.output_devices()?
        .find(|device| name_matches(name, &device_name(device)))
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

/// Énumère les périphériques d'entrée et de sortie
pub fn list_devices() -> AudioResult<DeviceList> {
    let host = cpal::default_host();
    let default_input = host.default_input_device().map(|d| device_name(&d));
    let default_output = host.default_output_device().map(|d| device_name(&d));

    let inputs = host
        .input_devices()?
        .map(|d| {
            let name = device_name(&d);
            DeviceInfo { is_default: default_input.as_deref() == Some(name.as_str()), name }
        })
        .collect();

    let outputs = host
        .output_devices()?
        .map(|d| {
            let name = device_name(&d);
            DeviceInfo { is_default: default_output.as_deref() == Some(name.as_str()), name }
        })
        .collect();

    Ok(DeviceList { inputs, outputs })
}

/// Rang de préférence d'un format d'échantillon (plus petit = préféré)
fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::I16 => Some(0),
        SampleFormat::F32 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

/// Choisit une configuration de stream au sample rate demandé
///
/// Préfère le nombre de canaux configuré, puis le format i16 (celui du codec).
/// Les périphériques multi-canaux sont acceptés : la capture mixe les canaux
/// en mono et la lecture duplique le mono sur chaque canal.
pub(crate) fn select_stream_config<I>(ranges: I, config: &AudioConfig) -> AudioResult<SupportedStreamConfig>
where
    I: Iterator<Item = SupportedStreamConfigRange>,
{
    let rate = config.sample_rate;

    ranges
        .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
        .filter_map(|range| format_rank(range.sample_format()).map(|rank| (range, rank)))
        .min_by_key(|(range, rank)| (range.channels() != config.channels, *rank))
        .map(|(range, _)| range.with_sample_rate(rate))
        .ok_or_else(|| {
            AudioError::ConfigError(format!("Sample rate {} Hz non supporté par le périphérique", rate))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matching() {
        assert!(name_matches("USB Headset", "USB Headset"));
        assert!(name_matches("headset", "USB Headset Analog Stereo"));
        assert!(!name_matches("Webcam", "USB Headset"));
    }

    #[test]
    fn test_format_preference() {
        assert!(format_rank(SampleFormat::I16) < format_rank(SampleFormat::F32));
        assert!(format_rank(SampleFormat::F32) < format_rank(SampleFormat::U16));
        assert_eq!(format_rank(SampleFormat::U8), None);
    }

    #[test]
    #[ignore] // Nécessite un hôte audio
    fn test_list_devices() {
        let devices = list_devices().expect("Énumération");
        println!("Entrées : {:?}", devices.inputs);
        println!("Sorties : {:?}", devices.outputs);
    }
}
