//! Forward kinematics of a planar serial arm.
//!
//! Joint `i` rotates link `i` relative to link `i - 1`; the base sits at the
//! origin and points along +y when all joints are zero.
//!
//! ```text
//!            ● end_effector
//!           /
//!          ● link_2
//!          |
//!          ● link_1
//!          |
//!    ──────■────── base (0, 0)
//! ```

use std::collections::BTreeMap;

use her_ddpg::{ArmState, Pose3};

pub type Point2 = [f32; 2];

/// Name of the end-effector reference point.
pub const END_EFFECTOR: &str = "end_effector";

/// Planar arm with revolute joints.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarArm {
    link_lengths: Vec<f32>,
    joint_limit: f32,
}

impl PlanarArm {
    pub fn new(link_lengths: Vec<f32>, joint_limit: f32) -> Self {
        Self {
            link_lengths,
            joint_limit,
        }
    }

    pub fn n_joints(&self) -> usize {
        self.link_lengths.len()
    }

    pub fn joint_limit(&self) -> f32 {
        self.joint_limit
    }

    /// Joint positions from base to tip (`n_joints + 1` points).
    pub fn forward(&self, joints: &[f32]) -> Vec<Point2> {
        let mut points = Vec::with_capacity(self.link_lengths.len() + 1);
        let mut position = [0.0f32, 0.0];
        let mut heading = std::f32::consts::FRAC_PI_2;
        points.push(position);
        for (length, angle) in self.link_lengths.iter().zip(joints) {
            heading += angle;
            position = [
                position[0] + length * heading.cos(),
                position[1] + length * heading.sin(),
            ];
            points.push(position);
        }
        points
    }

    pub fn end_effector(&self, joints: &[f32]) -> Point2 {
        self.forward(joints).last().copied().unwrap_or([0.0, 0.0])
    }

    /// Named poses: `link_1 .. link_{n-1}` plus `end_effector`.
    pub fn poses(&self, joints: &[f32]) -> BTreeMap<String, Pose3> {
        let points = self.forward(joints);
        let n = points.len() - 1;
        points
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, p)| {
                let name = if i == n {
                    END_EFFECTOR.to_string()
                } else {
                    format!("link_{}", i)
                };
                (name, [p[0], p[1], 0.0])
            })
            .collect()
    }

    pub fn state(&self, joints: &[f32]) -> ArmState {
        ArmState::new(joints.to_vec(), self.poses(joints))
    }

    /// Clamp every joint into `[-joint_limit, joint_limit]`.
    pub fn clamp(&self, joints: &mut [f32]) {
        for q in joints.iter_mut() {
            *q = q.clamp(-self.joint_limit, self.joint_limit);
        }
    }

    /// Whether any two non-adjacent links cross.
    pub fn self_collides(&self, joints: &[f32]) -> bool {
        let points = self.forward(joints);
        let links = points.len() - 1;
        for i in 0..links {
            for j in (i + 2)..links {
                if segments_intersect(points[i], points[i + 1], points[j], points[j + 1]) {
                    return true;
                }
            }
        }
        false
    }
}

fn cross(o: Point2, a: Point2, b: Point2) -> f32 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

/// Proper intersection test between segments `p1-p2` and `q1-q2`.
pub fn segments_intersect(p1: Point2, p2: Point2, q1: Point2, q2: Point2) -> bool {
    let d1 = cross(q1, q2, p1);
    let d2 = cross(q1, q2, p2);
    let d3 = cross(p1, p2, q1);
    let d4 = cross(p1, p2, q2);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

/// Euclidean distance between joint configurations.
pub fn joint_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn arm() -> PlanarArm {
        PlanarArm::new(vec![0.4, 0.3, 0.2], 2.8)
    }

    fn close(a: Point2, b: Point2) -> bool {
        (a[0] - b[0]).abs() < 1e-5 && (a[1] - b[1]).abs() < 1e-5
    }

    #[test]
    fn test_zero_configuration_points_up() {
        let points = arm().forward(&[0.0, 0.0, 0.0]);
        assert_eq!(points.len(), 4);
        assert!(close(points[0], [0.0, 0.0]));
        assert!(close(points[3], [0.0, 0.9]));
    }

    #[test]
    fn test_bent_configuration() {
        // First joint turns the arm to -x, second bends back to +y.
        let points = arm().forward(&[FRAC_PI_2, -FRAC_PI_2, 0.0]);
        assert!(close(points[1], [-0.4, 0.0]));
        assert!(close(points[3], [-0.4, 0.5]));
    }

    #[test]
    fn test_poses_named() {
        let poses = arm().poses(&[0.0, 0.0, 0.0]);
        assert_eq!(poses.len(), 3);
        assert!(poses.contains_key("link_1"));
        assert!(poses.contains_key("link_2"));
        let ee = poses[END_EFFECTOR];
        assert!((ee[1] - 0.9).abs() < 1e-5);
        assert_eq!(ee[2], 0.0);
    }

    #[test]
    fn test_clamp() {
        let mut joints = vec![3.5, -4.0, 0.1];
        arm().clamp(&mut joints);
        assert_eq!(joints, vec![2.8, -2.8, 0.1]);
    }

    #[test]
    fn test_segment_intersection() {
        assert!(segments_intersect([0.0, 0.0], [1.0, 1.0], [0.0, 1.0], [1.0, 0.0]));
        assert!(!segments_intersect([0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]));
    }

    #[test]
    fn test_self_collision() {
        let arm = PlanarArm::new(vec![0.5, 0.5, 0.5, 0.5], 3.0);
        assert!(!arm.self_collides(&[0.0, 0.0, 0.0, 0.0]));
        // Square fold closes the loop onto the first link.
        assert!(arm.self_collides(&[0.0, 2.0, 2.0, 2.0]));
    }

    #[test]
    fn test_joint_distance() {
        assert!((joint_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
    }
}
