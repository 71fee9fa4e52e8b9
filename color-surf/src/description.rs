use crate::descriptors::{normalize, DESCRIPTOR_LEN};
use crate::KeyPoint;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The keypoints of an image with their orientations and Color SURF descriptors.
///
/// The three sequences are parallel. Every descriptor is the concatenation of
/// the 64 values of each channel, in channel order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Description {
    keypoints: Vec<KeyPoint>,
    orientations: Vec<f32>,
    descriptors: Vec<Vec<f32>>,
    channels: usize,
}

impl Description {
    /// Concatenate per-channel descriptors (indexed by channel, then keypoint).
    pub(crate) fn assemble(
        keypoints: Vec<KeyPoint>,
        orientations: Vec<f32>,
        channel_descriptors: Vec<Vec<Vec<f32>>>,
        normalize_descriptors: bool,
    ) -> Self {
        let channels = channel_descriptors.len();
        let descriptors = (0..keypoints.len())
            .map(|k| {
                let mut descriptor: Vec<f32> = channel_descriptors
                    .iter()
                    .flat_map(|channel| channel[k].iter().copied())
                    .collect();
                if normalize_descriptors {
                    normalize(&mut descriptor);
                }
                descriptor
            })
            .collect();
        Self {
            keypoints,
            orientations,
            descriptors,
            channels,
        }
    }

    pub fn keypoints(&self) -> &[KeyPoint] {
        &self.keypoints
    }

    /// Orientation of each keypoint in radians, 0 for upright keypoints.
    pub fn orientations(&self) -> &[f32] {
        &self.orientations
    }

    pub fn descriptors(&self) -> &[Vec<f32>] {
        &self.descriptors
    }

    /// Number of channels that were described.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Length of every descriptor.
    pub fn descriptor_len(&self) -> usize {
        self.channels * DESCRIPTOR_LEN
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&KeyPoint, f32, &[f32])> + '_ {
        self.keypoints
            .iter()
            .zip(&self.orientations)
            .zip(&self.descriptors)
            .map(|((keypoint, &orientation), descriptor)| {
                (keypoint, orientation, descriptor.as_slice())
            })
    }
}
