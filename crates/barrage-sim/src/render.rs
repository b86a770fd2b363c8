//! Render-side snapshot.
//!
//! The simulation does not draw; once per frame it assembles an ordered
//! list of sprite commands plus the sound cues that fired, and the
//! presentation layer consumes that. Sprites and sounds are referenced by
//! string key, resolved by the resource layer outside the core.

use barrage_core::color::Color;
use glam::Vec2;

use crate::entity::DrawLayer;

#[derive(Debug, Clone)]
pub struct SpriteCmd {
    pub layer: DrawLayer,
    pub sprite: &'static str,
    pub pos: Vec2,
    pub angle: f32,
    pub scale: Vec2,
    pub color: Color,
    pub shader: Option<&'static str>,
}

impl SpriteCmd {
    pub fn new(layer: DrawLayer, sprite: &'static str, pos: Vec2) -> Self {
        Self {
            layer,
            sprite,
            pos,
            angle: 0.0,
            scale: Vec2::ONE,
            color: Color::default(),
            shader: None,
        }
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_scale(mut self, scale: Vec2) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_shader(mut self, shader: &'static str) -> Self {
        self.shader = Some(shader);
        self
    }
}

/// Everything the presentation layer needs for one frame.
#[derive(Debug, Default)]
pub struct RenderFrame {
    /// Sprite commands in draw-layer order (stable within a layer).
    pub sprites: Vec<SpriteCmd>,
    /// Sound effect keys that fired this frame, in trigger order.
    pub audio: Vec<&'static str>,
}
