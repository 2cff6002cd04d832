// ── Change sets ──

use bitflags::bitflags;

bitflags! {
    /// Which slices of the store a mutation touched. Broadcast by the
    /// engine after every applied event or builder response.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct ChangeSet: u32 {
        const SCENES = 1 << 0;
        const SCENE_ITEMS = 1 << 1;
        const GROUPS = 1 << 2;
        const SOURCES = 1 << 3;
        const AUDIO = 1 << 4;
        const FILTERS = 1 << 5;
        const TRANSITIONS = 1 << 6;
        const OUTPUTS = 1 << 7;
        const PROFILES = 1 << 8;
        const COLLECTIONS = 1 << 9;
        const PROGRAM = 1 << 10;
        const MEDIA = 1 << 11;
        const STATS = 1 << 12;
        const DSK = 1 << 13;
        const REMOTE = 1 << 14;
        const VENDOR = 1 << 15;
        const METERS = 1 << 16;
    }
}

impl ChangeSet {
    /// Changes that can alter a derived choice list.
    pub fn is_structural(self) -> bool {
        self.intersects(!(Self::MEDIA | Self::STATS | Self::METERS | Self::VENDOR))
    }
}
