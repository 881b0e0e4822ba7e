/// Admits every `stride`-th frame.
///
/// The counter advances before the check, so with stride 2 the 2nd,
/// 4th, 6th… frames are processed. A stride of 0 is treated as 1.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    stride: u32,
    index: u64,
}

impl FrameSampler {
    pub fn new(stride: u32) -> Self {
        Self {
            stride: stride.max(1),
            index: 0,
        }
    }

    /// Count one incoming frame and report whether it should be processed.
    pub fn admit(&mut self) -> bool {
        self.index += 1;
        self.index % u64::from(self.stride) == 0
    }

    pub fn frames_seen(&self) -> u64 {
        self.index
    }
}
