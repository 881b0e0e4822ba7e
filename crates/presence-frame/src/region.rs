use std::fmt;
use std::str::FromStr;

/// Axis-aligned face rectangle from an external detector, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole frame.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Intersect with a `width`×`height` frame. `None` if nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<FaceRect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        (w > 0 && h > 0).then(|| FaceRect::new(self.x, self.y, w, h))
    }
}

impl fmt::Display for FaceRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

/// Parses `x,y,width,height`.
impl FromStr for FaceRect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid face rect {s:?}: {e}"))?;
        match parts[..] {
            [x, y, width, height] => Ok(FaceRect::new(x, y, width, height)),
            _ => Err(format!("face rect must be x,y,width,height, got {s:?}")),
        }
    }
}

/// Pick the face with the greatest area; the first one wins ties.
pub fn largest_face(faces: &[FaceRect]) -> Option<&FaceRect> {
    faces.iter().fold(None, |best: Option<&FaceRect>, face| match best {
        Some(b) if b.area() >= face.area() => Some(b),
        _ => Some(face),
    })
}
