pub mod bridge;
pub mod color;
pub mod correction;
pub mod format;
pub mod frame;
pub mod padding;
pub mod resize;
pub mod tensor;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use bridge::{LayoutMetadata, ResampleRequest, Resampler, from_tensor_layout, to_tensor_layout};
pub use color::{ColorMatrix, ColorRange, DEFAULT_MATRIX};
pub use correction::color_correct;
pub use format::{ColorFamily, PixelFormat, SampleType};
pub use frame::{Frame, FrameDescriptor, FrameError, Plane};
pub use padding::{PaddingPlan, apply, plan_padding, revert};
pub use tensor::{ChannelLayout, TensorData, TensorFrame, TensorPrecision};
