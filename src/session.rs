//! Scan session: the ordered list of captured pages.
//!
//! A [`ScanSession`] is a value, not shared storage. Every edit returns a new
//! session and validates its indices, so a screen can hold the current
//! session, apply an edit, and swap the result in without any other code
//! observing a half-applied change.

use crate::error::ExamScanError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Display rotation of a page, clockwise.
///
/// Rotation is cosmetic: it is applied by the viewer, never to the image
/// bytes sent for transcription or cropped for diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// The next rotation clockwise.
    pub fn clockwise(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }
}

/// One captured or imported page image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Full-resolution source image.
    pub source: PathBuf,
    /// Known pixel width, if the capture layer reported it.
    pub width: Option<u32>,
    /// Known pixel height, if the capture layer reported it.
    pub height: Option<u32>,
    #[serde(default)]
    pub rotation: Rotation,
}

impl Page {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            width: None,
            height: None,
            rotation: Rotation::default(),
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

/// The ordered pages of an in-progress scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSession {
    pages: Vec<Page>,
}

impl ScanSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pages(pages: Vec<Page>) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn into_pages(self) -> Vec<Page> {
        self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Append a page.
    pub fn add(&self, page: Page) -> ScanSession {
        let mut pages = self.pages.clone();
        pages.push(page);
        Self { pages }
    }

    /// Remove the page at `index`.
    pub fn remove(&self, index: usize) -> Result<ScanSession, ExamScanError> {
        self.check(index)?;
        let mut pages = self.pages.clone();
        pages.remove(index);
        Ok(Self { pages })
    }

    /// Replace the page at `index` (e.g. after a retake).
    pub fn replace(&self, index: usize, page: Page) -> Result<ScanSession, ExamScanError> {
        self.check(index)?;
        let mut pages = self.pages.clone();
        pages[index] = page;
        Ok(Self { pages })
    }

    /// Rotate the page at `index` a quarter turn clockwise.
    pub fn rotate(&self, index: usize) -> Result<ScanSession, ExamScanError> {
        self.check(index)?;
        let mut pages = self.pages.clone();
        pages[index].rotation = pages[index].rotation.clockwise();
        Ok(Self { pages })
    }

    /// Swap two pages.
    pub fn swap(&self, a: usize, b: usize) -> Result<ScanSession, ExamScanError> {
        self.check(a)?;
        self.check(b)?;
        let mut pages = self.pages.clone();
        pages.swap(a, b);
        Ok(Self { pages })
    }

    /// Move the page at `from` so that it ends up at index `to`, shifting the
    /// pages in between.
    pub fn reorder(&self, from: usize, to: usize) -> Result<ScanSession, ExamScanError> {
        self.check(from)?;
        self.check(to)?;
        let mut pages = self.pages.clone();
        let page = pages.remove(from);
        pages.insert(to, page);
        Ok(Self { pages })
    }

    /// An empty session.
    pub fn clear(&self) -> ScanSession {
        Self::default()
    }

    fn check(&self, index: usize) -> Result<(), ExamScanError> {
        if index < self.pages.len() {
            Ok(())
        } else {
            Err(ExamScanError::PageOutOfRange {
                page: index,
                total: self.pages.len(),
            })
        }
    }
}
