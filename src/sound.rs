use std::collections::HashMap;

/// Compile-time bundle of every sound the bot can play, keyed by command
/// name. The set is closed and static; the bytes are ogg containers exactly
/// as shipped.
pub struct SoundStore {
    sounds: HashMap<&'static str, &'static [u8]>,
}

impl SoundStore {
    pub fn bundled() -> Self {
        let mut sounds: HashMap<&'static str, &'static [u8]> = HashMap::new();
        sounds.insert("yey", include_bytes!("../sound/yey.opus").as_slice());
        sounds.insert("boo", include_bytes!("../sound/boo.opus").as_slice());
        Self { sounds }
    }

    pub fn get(&self, key: &str) -> Option<&'static [u8]> {
        self.sounds.get(key).copied()
    }
}
