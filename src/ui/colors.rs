use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use egui::Color32;

const PALETTE: [Color32; 7] = [
    Color32::from_rgb(0xFF, 0x57, 0x22),
    Color32::from_rgb(0x4C, 0xAF, 0x50),
    Color32::from_rgb(0x21, 0x96, 0xF3),
    Color32::from_rgb(0x9C, 0x27, 0xB0),
    Color32::from_rgb(0xFF, 0x98, 0x00),
    Color32::from_rgb(0x00, 0xBC, 0xD4),
    Color32::from_rgb(0xE9, 0x1E, 0x63),
];

/// Same user, same colour, every run.
pub fn palette_color(user: &str) -> Color32 {
    let mut hasher = DefaultHasher::new();
    user.hash(&mut hasher);
    let index = (hasher.finish() % PALETTE.len() as u64) as usize;
    PALETTE[index]
}

/// Lazily filled cache over [`palette_color`].
#[derive(Debug, Default)]
pub struct UserColors {
    assigned: HashMap<String, Color32>,
}

impl UserColors {
    pub fn color_for(&mut self, user: &str) -> Color32 {
        *self
            .assigned
            .entry(user.to_owned())
            .or_insert_with(|| palette_color(user))
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}
