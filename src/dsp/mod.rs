pub mod emphasis;
pub mod griffin_lim;
pub mod mel;
pub mod normalize;
pub mod stft;
pub mod window;
