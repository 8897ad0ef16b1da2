//! One-shot environment capture around the car
//!
//! The capture hides the car, renders six faces from the car's position,
//! shows the car again and hands the resulting cube map to every mesh in the
//! car subtree. It runs once, after the car is attached and before the frame
//! driver's first invocation.

use glam::Vec3;
use thiserror::Error;
use tracing::{debug, info};

use crate::graph::{EnvMapId, NodeId, SceneGraph};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Environment already captured")]
    AlreadyCaptured,
    #[error("Capture has not begun")]
    NotStarted,
    #[error("Car node {0:?} is not in the scene graph")]
    MissingCar(NodeId),
    #[error("Face {face:?} has {actual} bytes, expected {expected}")]
    FaceSize { face: CubeFace, expected: usize, actual: usize },
    #[error("Cube face of {0}px does not fit in memory")]
    ResolutionTooLarge(u32),
    #[error("Face {0:?} was never captured")]
    MissingFace(CubeFace),
    #[error("Capture failed: {0}")]
    Backend(String),
}

/// Cube faces in texture layer order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// World-space (forward, up) of the camera rendering this layer.
    ///
    /// The renderer samples cube maps with Z mirrored, so the Z layers look
    /// down the opposite world axis and no image flip is needed.
    pub fn basis(self) -> (Vec3, Vec3) {
        match self {
            CubeFace::PosX => (Vec3::X, Vec3::Y),
            CubeFace::NegX => (Vec3::NEG_X, Vec3::Y),
            CubeFace::PosY => (Vec3::Y, Vec3::Z),
            CubeFace::NegY => (Vec3::NEG_Y, Vec3::NEG_Z),
            CubeFace::PosZ => (Vec3::NEG_Z, Vec3::Y),
            CubeFace::NegZ => (Vec3::Z, Vec3::Y),
        }
    }
}

/// What the engine needs to render the six faces
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRequest {
    pub position: Vec3,
    pub resolution: u32,
}

/// Synchronous six-face renderer
pub trait CubeCapturer {
    fn capture(&mut self, graph: &SceneGraph, request: &CaptureRequest) -> Result<EnvMapId, CaptureError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CapturePhase {
    Idle,
    InProgress { probe_position: Vec3 },
    Done(EnvMapId),
}

/// The capture procedure bound to one car subtree
#[derive(Debug, Clone)]
pub struct EnvironmentCapture {
    car_root: NodeId,
    resolution: u32,
    phase: CapturePhase,
}

impl EnvironmentCapture {
    pub fn new(car_root: NodeId, resolution: u32) -> Self {
        Self {
            car_root,
            resolution,
            phase: CapturePhase::Idle,
        }
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn env_map(&self) -> Option<EnvMapId> {
        match self.phase {
            CapturePhase::Done(id) => Some(id),
            _ => None,
        }
    }

    /// Hide the car and place the probe at its world position
    pub fn begin(&mut self, graph: &mut SceneGraph) -> Result<CaptureRequest, CaptureError> {
        match self.phase {
            CapturePhase::Idle => {}
            _ => return Err(CaptureError::AlreadyCaptured),
        }
        let position = graph
            .world_position(self.car_root)
            .ok_or(CaptureError::MissingCar(self.car_root))?;
        graph.set_visible(self.car_root, false);
        self.phase = CapturePhase::InProgress { probe_position: position };
        debug!("Environment capture started at {:?}", position);
        Ok(CaptureRequest {
            position,
            resolution: self.resolution,
        })
    }

    /// Show the car again and assign the cube map to every mesh below it.
    ///
    /// Returns how many meshes received the map.
    pub fn finish(&mut self, graph: &mut SceneGraph, env_map: EnvMapId) -> Result<usize, CaptureError> {
        match self.phase {
            CapturePhase::InProgress { .. } => {}
            CapturePhase::Idle => return Err(CaptureError::NotStarted),
            CapturePhase::Done(_) => return Err(CaptureError::AlreadyCaptured),
        }
        graph.set_visible(self.car_root, true);
        let mut assigned = 0;
        for id in graph.descendants(self.car_root) {
            if let Some(mesh) = graph.node_mut(id).and_then(|n| n.mesh.as_mut()) {
                mesh.env_map = Some(env_map);
                assigned += 1;
            }
        }
        self.phase = CapturePhase::Done(env_map);
        info!("Environment capture applied to {} meshes", assigned);
        Ok(assigned)
    }

    /// All five steps in one call
    pub fn run(
        &mut self,
        graph: &mut SceneGraph,
        capturer: &mut dyn CubeCapturer,
    ) -> Result<EnvMapId, CaptureError> {
        let request = self.begin(graph)?;
        let env_map = match capturer.capture(graph, &request) {
            Ok(id) => id,
            Err(err) => {
                // Never leave the car hidden
                graph.set_visible(self.car_root, true);
                self.phase = CapturePhase::Idle;
                return Err(err);
            }
        };
        self.finish(graph, env_map)?;
        Ok(env_map)
    }
}

/// RGBA8 cube texture with a full mip chain, stored layer-major
/// (face 0 mips 0..n, then face 1, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct CubeMap {
    pub size: u32,
    pub mip_levels: u32,
    pub data: Vec<u8>,
}

impl CubeMap {
    fn mip_bytes(size: u32, level: u32) -> usize {
        let edge = (size >> level).max(1) as usize;
        edge * edge * 4
    }

    fn face_bytes(&self) -> usize {
        (0..self.mip_levels).map(|l| Self::mip_bytes(self.size, l)).sum()
    }

    /// Pixels of one face at one mip level
    pub fn face_mip(&self, face: CubeFace, level: u32) -> &[u8] {
        let start = face.index() * self.face_bytes()
            + (0..level).map(|l| Self::mip_bytes(self.size, l)).sum::<usize>();
        &self.data[start..start + Self::mip_bytes(self.size, level)]
    }
}

/// Collects captured faces and assembles the mipmapped cube
#[derive(Debug, Clone)]
pub struct CubeMapBuilder {
    size: u32,
    faces: [Option<Vec<u8>>; 6],
}

impl CubeMapBuilder {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            faces: std::array::from_fn(|_| None),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn set_face(&mut self, face: CubeFace, rgba: Vec<u8>) -> Result<(), CaptureError> {
        let edge = self.size as usize;
        let expected = edge
            .checked_mul(edge)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or(CaptureError::ResolutionTooLarge(self.size))?;
        if rgba.len() != expected {
            return Err(CaptureError::FaceSize {
                face,
                expected,
                actual: rgba.len(),
            });
        }
        self.faces[face.index()] = Some(rgba);
        Ok(())
    }

    pub fn has_face(&self, face: CubeFace) -> bool {
        self.faces[face.index()].is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.faces.iter().all(Option::is_some)
    }

    pub fn build(&self) -> Result<CubeMap, CaptureError> {
        let mip_levels = self.size.max(1).ilog2() + 1;
        let mut data = Vec::new();
        for face in CubeFace::ALL {
            let base = self.faces[face.index()]
                .as_ref()
                .ok_or(CaptureError::MissingFace(face))?;
            let mut level = base.clone();
            let mut edge = self.size;
            data.extend_from_slice(&level);
            for _ in 1..mip_levels {
                level = downsample(&level, edge);
                edge = (edge / 2).max(1);
                data.extend_from_slice(&level);
            }
        }
        Ok(CubeMap {
            size: self.size,
            mip_levels,
            data,
        })
    }
}

/// 2x2 box filter of a square RGBA8 image with edge length `edge`
fn downsample(src: &[u8], edge: u32) -> Vec<u8> {
    let edge = edge as usize;
    let half = (edge / 2).max(1);
    let mut out = vec![0u8; half * half * 4];
    for y in 0..half {
        for x in 0..half {
            for c in 0..4 {
                let mut sum = 0u32;
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let sx = (x * 2 + dx).min(edge - 1);
                    let sy = (y * 2 + dy).min(edge - 1);
                    sum += src[(sy * edge + sx) * 4 + c] as u32;
                }
                out[(y * half + x) * 4 + c] = ((sum + 2) / 4) as u8;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{MeshInfo, Transform};

    struct RecordingCapturer {
        car: NodeId,
        car_visible_during_capture: Option<bool>,
        requests: Vec<CaptureRequest>,
    }

    impl CubeCapturer for RecordingCapturer {
        fn capture(&mut self, graph: &SceneGraph, request: &CaptureRequest) -> Result<EnvMapId, CaptureError> {
            self.car_visible_during_capture = Some(graph.is_effectively_visible(self.car));
            self.requests.push(*request);
            Ok(EnvMapId(9))
        }
    }

    struct FailingCapturer;

    impl CubeCapturer for FailingCapturer {
        fn capture(&mut self, _: &SceneGraph, _: &CaptureRequest) -> Result<EnvMapId, CaptureError> {
            Err(CaptureError::Backend("device lost".into()))
        }
    }

    fn car_scene() -> (SceneGraph, NodeId, Vec<NodeId>) {
        let mut graph = SceneGraph::new();
        graph.add_root("ground", Transform::IDENTITY);
        let car = graph.add_root("car", Transform::from_translation(Vec3::new(0.0, -0.05, 0.0)));
        let mut meshes = Vec::new();
        for name in ["body", "glass"] {
            let mesh = graph.add_child(car, name, Transform::IDENTITY);
            graph.node_mut(mesh).unwrap().mesh = Some(MeshInfo::default());
            meshes.push(mesh);
        }
        (graph, car, meshes)
    }

    #[test]
    fn test_capture_hides_car_and_assigns_env_map() {
        let (mut graph, car, meshes) = car_scene();
        let mut capture = EnvironmentCapture::new(car, 256);
        let mut capturer = RecordingCapturer {
            car,
            car_visible_during_capture: None,
            requests: Vec::new(),
        };

        let env = capture.run(&mut graph, &mut capturer).unwrap();

        assert_eq!(capturer.car_visible_during_capture, Some(false));
        assert_eq!(capturer.requests.len(), 1);
        assert!(capturer.requests[0].position.abs_diff_eq(Vec3::new(0.0, -0.05, 0.0), 1e-6));
        assert_eq!(capturer.requests[0].resolution, 256);
        assert!(graph.is_effectively_visible(car));
        for mesh in meshes {
            assert_eq!(graph.node(mesh).unwrap().mesh.unwrap().env_map, Some(env));
        }
        assert_eq!(capture.env_map(), Some(env));
    }

    #[test]
    fn test_capture_happens_once() {
        let (mut graph, car, _) = car_scene();
        let mut capture = EnvironmentCapture::new(car, 256);
        let mut capturer = RecordingCapturer {
            car,
            car_visible_during_capture: None,
            requests: Vec::new(),
        };
        capture.run(&mut graph, &mut capturer).unwrap();
        assert_eq!(capture.run(&mut graph, &mut capturer), Err(CaptureError::AlreadyCaptured));
        assert_eq!(capturer.requests.len(), 1);
    }

    #[test]
    fn test_no_env_map_until_finish() {
        let (mut graph, car, meshes) = car_scene();
        let mut capture = EnvironmentCapture::new(car, 256);
        assert_eq!(capture.finish(&mut graph, EnvMapId(1)), Err(CaptureError::NotStarted));

        capture.begin(&mut graph).unwrap();
        assert!(!graph.is_effectively_visible(car));
        assert!(meshes.iter().all(|m| graph.node(*m).unwrap().mesh.unwrap().env_map.is_none()));

        assert_eq!(capture.finish(&mut graph, EnvMapId(1)), Ok(2));
        assert!(graph.is_effectively_visible(car));
    }

    #[test]
    fn test_failed_capture_restores_visibility() {
        let (mut graph, car, _) = car_scene();
        let mut capture = EnvironmentCapture::new(car, 256);
        let err = capture.run(&mut graph, &mut FailingCapturer).unwrap_err();
        assert_eq!(err, CaptureError::Backend("device lost".into()));
        assert!(graph.is_effectively_visible(car));
        assert_eq!(capture.phase(), CapturePhase::Idle);
    }

    #[test]
    fn test_face_bases_are_orthonormal_and_distinct() {
        let mut forwards = Vec::new();
        for face in CubeFace::ALL {
            let (forward, up) = face.basis();
            assert!((forward.length() - 1.0).abs() < 1e-6);
            assert!((up.length() - 1.0).abs() < 1e-6);
            assert_eq!(forward.dot(up), 0.0);
            assert!(!forwards.contains(&forward));
            forwards.push(forward);
        }
    }

    #[test]
    fn test_builder_validates_faces() {
        let mut builder = CubeMapBuilder::new(4);
        let err = builder.set_face(CubeFace::PosX, vec![0; 10]).unwrap_err();
        assert_eq!(
            err,
            CaptureError::FaceSize {
                face: CubeFace::PosX,
                expected: 64,
                actual: 10
            }
        );
        builder.set_face(CubeFace::PosX, vec![0; 64]).unwrap();
        assert!(!builder.is_complete());
        assert_eq!(builder.build().unwrap_err(), CaptureError::MissingFace(CubeFace::NegX));
    }

    #[test]
    fn test_builder_huge_face_is_an_error() {
        let mut builder = CubeMapBuilder::new(65536);
        let err = builder.set_face(CubeFace::PosX, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::FaceSize { actual: 0, .. } | CaptureError::ResolutionTooLarge(65536)
        ));
        assert!(!builder.has_face(CubeFace::PosX));
    }

    #[test]
    fn test_builder_mip_chain() {
        let mut builder = CubeMapBuilder::new(4);
        for (i, face) in CubeFace::ALL.into_iter().enumerate() {
            builder.set_face(face, vec![(i * 40) as u8; 64]).unwrap();
        }
        let cube = builder.build().unwrap();

        assert_eq!(cube.mip_levels, 3);
        assert_eq!(cube.data.len(), 6 * (64 + 16 + 4));
        assert_eq!(cube.face_mip(CubeFace::NegY, 0).len(), 64);
        assert_eq!(cube.face_mip(CubeFace::NegY, 2), &[120, 120, 120, 120]);
    }

    #[test]
    fn test_downsample_averages() {
        // 2x2 image: red channel 0, 100, 200, 100
        let src = [
            0, 0, 0, 255, 100, 0, 0, 255, //
            200, 0, 0, 255, 100, 0, 0, 255,
        ];
        assert_eq!(downsample(&src, 2), vec![100, 0, 0, 255]);
    }
}
