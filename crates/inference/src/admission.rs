//! Resolution gate applied before any engine work.

use crate::error::AdaptError;
use crate::model::ModelDescriptor;
use crate::shape::Size;
use frame::FrameDescriptor;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    Standard,
    /// Opt-in HD tier with a higher area ceiling.
    Relaxed,
}

impl ResolutionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionTier::Standard => "standard",
            ResolutionTier::Relaxed => "relaxed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    Static,
    Dynamic,
}

/// What admission granted for one frame descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub size: Size,
    pub area: u64,
    pub tier: ResolutionTier,
    pub mode: EngineMode,
}

/// Check the frame against the model's area ceilings and, for dynamic
/// engines, its shape rectangle. Both checks must pass.
pub fn admit(
    frame: &FrameDescriptor,
    model: &ModelDescriptor,
    tier: ResolutionTier,
    mode: EngineMode,
) -> Result<Envelope, AdaptError> {
    let size = Size::new(frame.width, frame.height);
    let area = frame.area();
    let limits = &model.limits;

    if let Some(hard) = limits.hard_area
        && area > hard
    {
        return Err(AdaptError::ResolutionExceeded {
            size,
            area,
            limit: hard,
            tier: "hard",
        });
    }

    let ceiling = match tier {
        ResolutionTier::Standard => limits.standard_area,
        ResolutionTier::Relaxed => limits.relaxed_area,
    };
    if let Some(limit) = ceiling
        && area > limit
    {
        return Err(AdaptError::ResolutionExceeded {
            size,
            area,
            limit,
            tier: tier.as_str(),
        });
    }

    if mode == EngineMode::Dynamic {
        let within_max = model.max_size.is_none_or(|max| size.fits_within(max));
        if !model.min_size.fits_within(size) || !within_max {
            return Err(AdaptError::DynamicShapeUnsupported {
                size,
                min: model.min_size,
                max: model.max_size.unwrap_or(Size::new(u32::MAX, u32::MAX)),
            });
        }
    }

    Ok(Envelope {
        size,
        area,
        tier,
        mode,
    })
}
