//! Fixed-size joint reference records carried by the last-value channel.
//!
//! A record is a plain-old-data structure: the channel moves it around as raw bytes,
//! and the reader reinterprets a frame only if its length is exactly the size of the record.

use bytemuck::{Pod, Zeroable};

/// Number of joint slots in the Hubo reference record.
pub const HUBO_JOINT_COUNT: usize = 42;

/// Default name of the reference channel.
pub const HUBO_CHAN_REF_NAME: &str = "hubo";

/// Record that provides per-joint reference angles, indexed by joint ordinal.
pub trait JointRecord: Pod + Send {
    /// Reference angles (radians), one per joint slot.
    fn reference(&self) -> &[f64];

    /// Mutable access to the reference angles, used by producers.
    fn reference_mut(&mut self) -> &mut [f64];

    /// Number of joint slots this record type carries.
    fn joint_count() -> usize {
        Self::zeroed().reference().len()
    }
}

/// Reference record as published on the `hubo` channel.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct HuboRef {
    /// Joint reference angles in radians.
    pub reference: [f64; HUBO_JOINT_COUNT],
    /// Per-joint control mode. Not interpreted by the simulation loop.
    pub mode: [i32; HUBO_JOINT_COUNT],
}

impl Default for HuboRef {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl HuboRef {
    /// Every joint follows a sine wave of `amplitude` radians and `frequency` Hz at time `t`,
    /// neighbouring joints shifted in phase against each other.
    pub fn sine_wave(t: f64, amplitude: f64, frequency: f64) -> Self {
        let mut record = Self::zeroed();
        let omega = 2.0 * std::f64::consts::PI * frequency;
        for (i, value) in record.reference.iter_mut().enumerate() {
            *value = amplitude * (omega * t + i as f64 * 0.25).sin();
        }
        record
    }
}

impl JointRecord for HuboRef {
    fn reference(&self) -> &[f64] {
        &self.reference
    }

    fn reference_mut(&mut self) -> &mut [f64] {
        &mut self.reference
    }
}

/// Record with only a reference array of `N` joints. Producers that drive smaller robots
/// (or tests) use it instead of the full [`HuboRef`].
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct JointSample<const N: usize> {
    pub reference: [f64; N],
}

// SAFETY: repr(C) wrapper around a single [f64; N], no padding and every bit pattern is valid.
unsafe impl<const N: usize> Zeroable for JointSample<N> {}
unsafe impl<const N: usize> Pod for JointSample<N> {}

impl<const N: usize> JointSample<N> {
    pub fn new(reference: [f64; N]) -> Self {
        Self { reference }
    }
}

impl<const N: usize> Default for JointSample<N> {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl<const N: usize> JointRecord for JointSample<N> {
    fn reference(&self) -> &[f64] {
        &self.reference
    }

    fn reference_mut(&mut self) -> &mut [f64] {
        &mut self.reference
    }
}

/// Size of the record in bytes, as it travels in a channel frame.
pub fn record_size<R: JointRecord>() -> usize {
    size_of::<R>()
}

/// Reinterprets a channel frame as a record. Returns the offending length if the frame
/// is not exactly one record long.
pub fn decode_record<R: JointRecord>(bytes: &[u8]) -> Result<R, usize> {
    if bytes.len() != record_size::<R>() {
        return Err(bytes.len());
    }
    // The frame buffer carries no alignment guarantee for f64.
    bytemuck::try_pod_read_unaligned::<R>(bytes).map_err(|_| bytes.len())
}

/// Raw bytes of the record, ready to be published.
pub fn encode_record<R: JointRecord>(record: &R) -> &[u8] {
    bytemuck::bytes_of(record)
}
