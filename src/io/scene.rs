//! JSON scene files.
//!
//! A scene file lists vertices, triangles (vertex indices plus a surface
//! index) and the surface table. Surfaces and geometry are validated while
//! loading, so a scene read from disk is ready for simulation.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sim::materials::Surface;
use crate::sim::scene::{Scene, Triangle};
use crate::Point;

/// On-disk layout of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneFile {
    pub vertices: Vec<Point>,
    pub triangles: Vec<Triangle>,
    pub surfaces: Vec<Surface>,
}

impl SceneFile {
    pub fn from_scene(scene: &Scene) -> Self {
        Self {
            vertices: scene.vertices().to_vec(),
            triangles: scene.triangles().to_vec(),
            surfaces: scene.surfaces().to_vec(),
        }
    }

    /// Validates the surfaces and the geometry.
    pub fn into_scene(self) -> Result<Scene> {
        for (i, surface) in self.surfaces.iter().enumerate() {
            surface
                .validate()
                .with_context(|| format!("Invalid surface {i}"))?;
        }
        Scene::new(self.vertices, self.triangles, self.surfaces).context("Invalid scene geometry")
    }
}

/// Reads and validates a scene from a JSON file.
pub fn read_scene(path: &Path) -> Result<Scene> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let reader = BufReader::new(file);

    let scene: SceneFile = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to deserialize scene from: {}", path.display()))?;

    scene
        .into_scene()
        .with_context(|| format!("Failed to load scene: {}", path.display()))
}

pub fn write_scene(path: &Path, scene: &Scene) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, &SceneFile::from_scene(scene))
        .with_context(|| format!("Failed to serialize scene to: {}", path.display()))?;

    Ok(())
}

/// Parses and validates a scene from a JSON string.
pub fn scene_from_str(json: &str) -> Result<Scene> {
    let scene: SceneFile =
        serde_json::from_str(json).context("Failed to deserialize scene from string")?;
    scene.into_scene()
}
