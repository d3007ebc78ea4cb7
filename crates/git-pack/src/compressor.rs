//! Delta search over a sliding window of recently loaded objects.

use git_utils::progress::Progress;

use crate::delta::XDelta;
use crate::entry::{Delta, Entry};
use crate::{ObjectSource, PackError};

/// Objects outside this size range are never deltified.
pub const OBJECT_SIZE: std::ops::RangeInclusive<usize> = 50..=0x2000_0000;
pub const MAX_DEPTH: usize = 50;
pub const WINDOW_SIZE: usize = 8;

struct Unpacked {
    entry: usize,
    data: Vec<u8>,
    index: Option<XDelta>,
}

/// A ring of the last [`WINDOW_SIZE`] loaded objects, each a delta source
/// candidate for the next target.
struct Window {
    objects: Vec<Option<Unpacked>>,
    offset: usize,
}

impl Window {
    fn new(size: usize) -> Self {
        Self {
            objects: (0..size).map(|_| None).collect(),
            offset: 0,
        }
    }

    fn add(&mut self, entry: usize, data: Vec<u8>) -> usize {
        let slot = self.offset;
        self.objects[slot] = Some(Unpacked { entry, data, index: None });
        self.offset = self.wrap(self.offset + 1);
        slot
    }

    /// Occupied slots other than the newest, newest first.
    fn sources(&self) -> Vec<usize> {
        let mut cursor = self.wrap(self.offset + self.objects.len() - 2);
        let limit = self.wrap(self.offset + self.objects.len() - 1);
        let mut slots = Vec::new();
        while cursor != limit {
            if self.objects[cursor].is_some() {
                slots.push(cursor);
            }
            cursor = self.wrap(cursor + self.objects.len() - 1);
        }
        slots
    }

    fn wrap(&self, n: usize) -> usize {
        n % self.objects.len()
    }
}

pub struct Compressor {
    window: Window,
    objects: Vec<usize>,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor {
    pub fn new() -> Self {
        Self::with_window(WINDOW_SIZE)
    }

    /// A compressor whose window holds `size` objects, the target included.
    /// Sizes below 2 leave no room for a source and are raised to 2.
    pub fn with_window(size: usize) -> Self {
        Self {
            window: Window::new(size.max(2)),
            objects: Vec::new(),
        }
    }

    /// Consider entry `index` for deltification if its size allows.
    pub fn add(&mut self, entries: &[Entry], index: usize) {
        if OBJECT_SIZE.contains(&entries[index].size()) {
            self.objects.push(index);
        }
    }

    /// Assign deltas to the added entries.
    pub fn build_deltas(
        mut self,
        entries: &mut [Entry],
        source: &impl ObjectSource,
        progress: &mut Progress,
    ) -> Result<(), PackError> {
        progress.start("Compressing objects", Some(self.objects.len() as u64));

        let mut order = std::mem::take(&mut self.objects);
        order.sort_by(|&a, &b| entries[a].sort_key().cmp(&entries[b].sort_key()));

        for &index in order.iter().rev() {
            self.build_delta(entries, source, index)?;
            progress.tick();
        }
        progress.stop();
        Ok(())
    }

    fn build_delta(
        &mut self,
        entries: &mut [Entry],
        source: &impl ObjectSource,
        index: usize,
    ) -> Result<(), PackError> {
        let raw = source.load_raw(&entries[index].oid)?;
        let target = self.window.add(index, raw.data);
        for slot in self.window.sources() {
            self.try_delta(entries, slot, target);
        }
        Ok(())
    }

    fn try_delta(&mut self, entries: &mut [Entry], source_slot: usize, target_slot: usize) {
        let (Some(src), Some(tgt)) = (
            self.window.objects[source_slot].as_ref(),
            self.window.objects[target_slot].as_ref(),
        ) else {
            return;
        };
        let (source, target) = (&entries[src.entry], &entries[tgt.entry]);

        if source.kind() != target.kind() || source.depth >= MAX_DEPTH {
            return;
        }
        let max_size = max_size_heuristic(source, target);
        if !compatible_sizes(source, target, max_size) {
            return;
        }

        if let Some(slot) = self.window.objects[source_slot].as_mut() {
            if slot.index.is_none() {
                slot.index = Some(XDelta::new(slot.data.clone()));
            }
        }
        let (Some(src), Some(tgt)) = (
            self.window.objects[source_slot].as_ref(),
            self.window.objects[target_slot].as_ref(),
        ) else {
            return;
        };
        let Some(index) = src.index.as_ref() else {
            return;
        };

        let delta = Delta::new(src.entry, index, &tgt.data);
        let base_depth = entries[src.entry].depth;
        let target = &mut entries[tgt.entry];

        if delta.size() > max_size {
            return;
        }
        if delta.size() == target.packed_size() && base_depth + 1 >= target.depth {
            return;
        }
        target.assign_delta(delta, base_depth);
    }
}

/// The largest delta worth keeping, scaled down as the base chain grows.
fn max_size_heuristic(source: &Entry, target: &Entry) -> usize {
    let (max_size, ref_depth) = match &target.delta {
        Some(delta) => (delta.size() as i64, target.depth as i64),
        None => (target.size() as i64 / 2 - 20, 1),
    };
    let scaled = max_size * (MAX_DEPTH as i64 - source.depth as i64) / (MAX_DEPTH as i64 + 1 - ref_depth);
    scaled.max(0) as usize
}

fn compatible_sizes(source: &Entry, target: &Entry, max_size: usize) -> bool {
    let size_diff = target.size().saturating_sub(source.size());
    max_size != 0 && size_diff < max_size && target.size() >= source.size() / 32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_visits_newest_first_and_skips_target() {
        let mut window = Window::new(4);
        for i in 0..3 {
            window.add(i, Vec::new());
        }
        let entries: Vec<_> = window
            .sources()
            .into_iter()
            .filter_map(|slot| window.objects[slot].as_ref().map(|u| u.entry))
            .collect();
        assert_eq!(entries, vec![1, 0]);

        for i in 3..6 {
            window.add(i, Vec::new());
        }
        let entries: Vec<_> = window
            .sources()
            .into_iter()
            .filter_map(|slot| window.objects[slot].as_ref().map(|u| u.entry))
            .collect();
        assert_eq!(entries, vec![4, 3, 2]);
    }
}
