//! Screen flow of the walkthrough front end, independent of how screens are
//! rendered.

use shared::domain::SessionId;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Home,
    Capture,
    Description,
    Gallery,
    Viewer(SessionId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} from {from:?}")]
pub struct NavigationError {
    pub from: Screen,
    pub action: &'static str,
}

#[derive(Debug, Default)]
pub struct Navigator {
    current: Screen,
}

impl Navigator {
    pub fn current(&self) -> &Screen {
        &self.current
    }

    pub fn start_capture(&mut self) -> Result<(), NavigationError> {
        self.go(matches!(self.current, Screen::Home), "start a capture", Screen::Capture)
    }

    /// An empty capture goes straight back home; otherwise the user describes it.
    pub fn capture_finished(&mut self, frame_count: usize) -> Result<(), NavigationError> {
        let next = if frame_count == 0 {
            Screen::Home
        } else {
            Screen::Description
        };
        self.go(matches!(self.current, Screen::Capture), "finish a capture", next)
    }

    pub fn description_saved(&mut self) -> Result<(), NavigationError> {
        self.go(
            matches!(self.current, Screen::Description),
            "save a description",
            Screen::Gallery,
        )
    }

    pub fn description_cancelled(&mut self) -> Result<(), NavigationError> {
        self.go(
            matches!(self.current, Screen::Description),
            "cancel a description",
            Screen::Home,
        )
    }

    pub fn open_gallery(&mut self) -> Result<(), NavigationError> {
        self.go(
            matches!(self.current, Screen::Home | Screen::Viewer(_)),
            "open the gallery",
            Screen::Gallery,
        )
    }

    pub fn open_viewer(&mut self, id: SessionId) -> Result<(), NavigationError> {
        self.go(
            matches!(self.current, Screen::Gallery),
            "open a walkthrough",
            Screen::Viewer(id),
        )
    }

    /// Viewer returns to the gallery; every other screen returns home.
    pub fn back(&mut self) {
        let next = match self.current {
            Screen::Viewer(_) => Screen::Gallery,
            _ => Screen::Home,
        };
        self.set(next);
    }

    pub fn home(&mut self) {
        self.set(Screen::Home);
    }

    fn go(&mut self, allowed: bool, action: &'static str, next: Screen) -> Result<(), NavigationError> {
        if !allowed {
            return Err(NavigationError {
                from: self.current.clone(),
                action,
            });
        }
        self.set(next);
        Ok(())
    }

    fn set(&mut self, next: Screen) {
        debug!("navigation: {:?} -> {next:?}", self.current);
        self.current = next;
    }
}

#[cfg(test)]
#[path = "tests/navigation_tests.rs"]
mod tests;
