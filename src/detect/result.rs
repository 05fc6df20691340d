use serde::{Deserialize, Serialize};

/// Confidence above which boxes are drawn heavier.
pub const STRONG_CONFIDENCE: f32 = 0.7;

/// One predicted region returned by the detection API.
///
/// Coordinates are in source-image pixels, with `(x, y)` at the box center.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class", default = "unknown_class")]
    pub class: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
}

fn unknown_class() -> String {
    "unknown".to_string()
}

/// Integer pixel corners of a detection box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }
}

/// Display color of a detection class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassColor {
    Red,
    Yellow,
    Blue,
    Magenta,
    White,
}

impl ClassColor {
    pub fn for_class(class: &str) -> Self {
        match class.to_lowercase().as_str() {
            "crack" => ClassColor::Red,
            "defect" => ClassColor::Yellow,
            "damage" => ClassColor::Blue,
            "fissure" => ClassColor::Magenta,
            _ => ClassColor::White,
        }
    }

    pub fn rgb(self) -> [u8; 3] {
        match self {
            ClassColor::Red => [255, 0, 0],
            ClassColor::Yellow => [255, 255, 0],
            ClassColor::Blue => [0, 0, 255],
            ClassColor::Magenta => [255, 0, 255],
            ClassColor::White => [255, 255, 255],
        }
    }
}

impl Detection {
    pub fn new(class: &str, confidence: f32, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            class: class.to_string(),
            confidence,
            x,
            y,
            width,
            height,
        }
    }

    /// Corners at center ± half-extent, truncated toward zero.
    pub fn bbox(&self) -> BoundingBox {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        BoundingBox {
            x1: (self.x - half_w) as i32,
            y1: (self.y - half_h) as i32,
            x2: (self.x + half_w) as i32,
            y2: (self.y + half_h) as i32,
        }
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x as i32, self.y as i32)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn color(&self) -> ClassColor {
        ClassColor::for_class(&self.class)
    }

    /// Outline thickness in pixels.
    pub fn thickness(&self) -> u32 {
        if self.confidence > STRONG_CONFIDENCE {
            3
        } else {
            2
        }
    }

    /// Overlay caption, e.g. `CRACK: 0.85`.
    pub fn label(&self) -> String {
        format!("{}: {:.2}", self.class.to_uppercase(), self.confidence)
    }
}
