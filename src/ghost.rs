use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use itertools::Itertools;

use crate::event::TypingEvent;
use crate::player::{Player, PlayerOptions};
use crate::recorder::RecordingData;

#[derive(Clone, Debug, Default)]
pub struct GhostOptions {
    pub id: Option<String>,
    pub label: Option<String>,
    pub color: Option<String>,
    pub playback_speed: Option<f64>,
}

/// A simulated typist: one player replaying a recording, driving a
/// shared cursor position. Ghosts never touch the primary session.
pub struct Ghost {
    id: String,
    label: Option<String>,
    color: Option<String>,
    position: Arc<AtomicUsize>,
    player: Player,
}

impl Ghost {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    /// Token index the ghost's cursor sits at right now.
    pub fn position(&self) -> usize {
        self.position.load(Ordering::SeqCst)
    }

    pub fn player(&self) -> &Player {
        &self.player
    }
}

/// Render-friendly snapshot of one ghost.
#[derive(Clone, Debug, PartialEq)]
pub struct GhostInfo {
    pub id: String,
    pub label: Option<String>,
    pub color: Option<String>,
    pub position: usize,
}

/// Registry of independent ghosts against one shared text layout. The
/// layout itself is the renderer's concern; this component only moves
/// position cells.
#[derive(Default)]
pub struct GhostManager {
    ghosts: HashMap<String, Ghost>,
    next_id: u64,
}

impl GhostManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ghost for `recording`. Its position follows the
    /// replayed entries: an evaluate moves to `index + 1`, an undo back
    /// to `index`, a reset to the start.
    pub fn add_ghost(&mut self, recording: RecordingData, options: GhostOptions) -> String {
        let id = options.id.unwrap_or_else(|| {
            self.next_id += 1;
            format!("ghost-{}", self.next_id)
        });

        let position = Arc::new(AtomicUsize::new(0));
        let cell = Arc::clone(&position);

        let mut player_options = PlayerOptions::new(recording);
        if let Some(speed) = options.playback_speed {
            player_options.playback_speed = speed;
        }
        player_options.on_event = Some(Arc::new(move |event: &TypingEvent| match event {
            TypingEvent::InputEvaluate { entry, .. } => {
                cell.store(entry.index + 1, Ordering::SeqCst)
            }
            TypingEvent::InputUndo { entry, .. } => cell.store(entry.index, Ordering::SeqCst),
            TypingEvent::SessionReset { .. } => cell.store(0, Ordering::SeqCst),
            _ => {}
        }));

        let ghost = Ghost {
            id: id.clone(),
            label: options.label,
            color: options.color,
            position,
            player: Player::new(player_options),
        };
        self.ghosts.insert(id.clone(), ghost);
        id
    }

    pub fn ghost(&self, id: &str) -> Option<&Ghost> {
        self.ghosts.get(id)
    }

    pub fn start_ghost(&self, id: &str) -> bool {
        match self.ghosts.get(id) {
            Some(ghost) => {
                ghost.player.play();
                true
            }
            None => false,
        }
    }

    pub fn start_all(&self) {
        for ghost in self.ghosts.values() {
            ghost.player.play();
        }
    }

    pub fn pause_all(&self) {
        for ghost in self.ghosts.values() {
            ghost.player.pause();
        }
    }

    /// Stop the ghost's player synchronously and forget it.
    pub fn remove_ghost(&mut self, id: &str) -> bool {
        match self.ghosts.remove(id) {
            Some(ghost) => {
                ghost.player.stop();
                true
            }
            None => false,
        }
    }

    /// Snapshots of every ghost, ordered by id for stable rendering.
    pub fn all_ghosts(&self) -> Vec<GhostInfo> {
        self.ghosts
            .values()
            .map(|g| GhostInfo {
                id: g.id.clone(),
                label: g.label.clone(),
                color: g.color.clone(),
                position: g.position(),
            })
            .sorted_by(|a, b| a.id.cmp(&b.id))
            .collect()
    }

    /// Stop everything and empty the registry.
    pub fn destroy(&mut self) {
        for (_, ghost) in self.ghosts.drain() {
            ghost.player.stop();
        }
    }

    pub fn len(&self) -> usize {
        self.ghosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ghosts.is_empty()
    }
}

impl Drop for GhostManager {
    fn drop(&mut self) {
        self.destroy();
    }
}
