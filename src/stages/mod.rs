//! Stage-type registry and configuration records.
//!
//! Construction parameters for the built-in stage types are plain
//! `#[repr(C)]` records handed to [`load_processor`] as opaque bytes; the
//! engine validates the embedded magic numbers when it instantiates a
//! stage. Field order, defaults and magic values are part of the engine
//! ABI and must not change.
//!
//! [`load_processor`]: crate::Launcher::load_processor

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Built-in stage types known to the reference engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Gain,
    Fir,
    Iir,
}

impl StageKind {
    /// Stage identifier accepted by `load_processor`.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Gain => "gain",
            Self::Fir => "fir",
            Self::Iir => "iir",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "gain" => Some(Self::Gain),
            "fir" => Some(Self::Fir),
            "iir" => Some(Self::Iir),
            _ => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Gain => "scalar gain applied to every sample",
            Self::Fir => "finite impulse response filter",
            Self::Iir => "infinite impulse response band-pass filter",
        }
    }

    pub fn all() -> &'static [Self] {
        &[Self::Gain, Self::Fir, Self::Iir]
    }
}

// ============================================================================
// Gain
// ============================================================================

/// Runtime parameters of the gain stage.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct GainParams {
    magic: u32,
    /// Scalar multiplier applied to every sample.
    pub gain_value: f32,
}

impl GainParams {
    pub const MAGIC: u32 = 0xDE2F_52AD;

    pub fn new(gain_value: f32) -> Self {
        Self {
            magic: Self::MAGIC,
            gain_value,
        }
    }

    pub fn magic_ok(&self) -> bool {
        self.magic == Self::MAGIC
    }
}

/// Construction record of the gain stage.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct GainSpec {
    magic: u32,
    pub params: GainParams,
}

impl GainSpec {
    pub const MAGIC: u32 = 0xDE2F_52AC;

    pub fn new(gain_value: f32) -> Self {
        Self {
            magic: Self::MAGIC,
            params: GainParams::new(gain_value),
        }
    }

    /// Opaque byte view handed to `load_processor`.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn magic_ok(&self) -> bool {
        self.magic == Self::MAGIC && self.params.magic_ok()
    }
}

// ============================================================================
// FIR
// ============================================================================

/// Construction record of the FIR filter stage.
///
/// `filter_length` and `filter_index` select an impulse response from the
/// engine's bank; `last_choice` is engine-internal scratch and stays zero.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct FirSpec {
    magic: u32,
    pub filter_length: u32,
    pub filter_index: u32,
    pub last_choice: u32,
}

impl FirSpec {
    pub const MAGIC: u32 = 0xAC90_FB31;

    pub fn new(filter_length: u32, filter_index: u32) -> Self {
        Self {
            magic: Self::MAGIC,
            filter_length,
            filter_index,
            last_choice: 0,
        }
    }

    /// Opaque byte view handed to `load_processor`.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn magic_ok(&self) -> bool {
        self.magic == Self::MAGIC
    }
}

impl Default for FirSpec {
    fn default() -> Self {
        Self::new(121_522, 121_522 / 2)
    }
}

// ============================================================================
// IIR
// ============================================================================

/// Construction record of the IIR band-pass stage.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct IirSpec {
    magic: u32,
    /// Sample rate of the material, in Hz.
    pub sample_rate: f32,
    /// Band-pass center frequency, in Hz.
    pub band_pass_freq: f32,
    /// Filter quality factor.
    pub band_pass_q: f32,
}

impl IirSpec {
    pub const MAGIC: u32 = 0x0CF1_04BD;

    pub fn new(sample_rate: f32, band_pass_freq: f32, band_pass_q: f32) -> Self {
        Self {
            magic: Self::MAGIC,
            sample_rate,
            band_pass_freq,
            band_pass_q,
        }
    }

    /// Opaque byte view handed to `load_processor`.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn magic_ok(&self) -> bool {
        self.magic == Self::MAGIC
    }
}

impl Default for IirSpec {
    fn default() -> Self {
        Self::new(96_000.0, 5_000.0, 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_id_round_trip() {
        for kind in StageKind::all() {
            assert_eq!(StageKind::from_id(kind.id()), Some(*kind));
        }
        assert_eq!(StageKind::from_id("chorus"), None);
    }

    #[test]
    fn test_record_layouts_are_stable() {
        assert_eq!(std::mem::size_of::<GainSpec>(), 12);
        assert_eq!(std::mem::size_of::<FirSpec>(), 16);
        assert_eq!(std::mem::size_of::<IirSpec>(), 16);
    }

    #[test]
    fn test_magic_leads_each_record() {
        let spec = GainSpec::new(2.0);
        assert_eq!(spec.as_bytes()[..4], GainSpec::MAGIC.to_ne_bytes());

        let spec = FirSpec::new(31, 15);
        assert_eq!(spec.as_bytes()[..4], FirSpec::MAGIC.to_ne_bytes());

        let spec = IirSpec::default();
        assert_eq!(spec.as_bytes()[..4], IirSpec::MAGIC.to_ne_bytes());
    }

    #[test]
    fn test_byte_round_trip() {
        let spec = GainSpec::new(0.75);
        let decoded: GainSpec = bytemuck::try_pod_read_unaligned(spec.as_bytes()).unwrap();
        assert!(decoded.magic_ok());
        assert_eq!(decoded.params.gain_value, 0.75);
    }

    #[test]
    fn test_serde_round_trip() {
        let spec = IirSpec::new(48_000.0, 1_000.0, 0.7);
        let json = serde_json::to_string(&spec).unwrap();
        let decoded: IirSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, spec);
        assert!(decoded.magic_ok());
    }

    #[test]
    fn test_defaults_match_engine_bank() {
        let fir = FirSpec::default();
        assert_eq!(fir.filter_length, 121_522);
        assert_eq!(fir.filter_index, 60_761);
        assert_eq!(fir.last_choice, 0);

        let iir = IirSpec::default();
        assert_eq!(iir.sample_rate, 96_000.0);
        assert_eq!(iir.band_pass_freq, 5_000.0);
        assert_eq!(iir.band_pass_q, 0.5);
    }
}
