//! Obstacle layouts and their occupancy images.

use rand::Rng;

use her_ddpg::WorkspaceImage;

use crate::config::ArmConfig;
use crate::kinematics::Point2;

/// Axis-aligned box obstacle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub center: Point2,
    pub half_size: Point2,
}

impl Obstacle {
    pub fn new(center: Point2, half_size: Point2) -> Self {
        Self { center, half_size }
    }

    pub fn contains(&self, p: Point2) -> bool {
        (p[0] - self.center[0]).abs() <= self.half_size[0]
            && (p[1] - self.center[1]).abs() <= self.half_size[1]
    }

    /// Liang-Barsky clip of segment `a-b` against the box.
    pub fn intersects_segment(&self, a: Point2, b: Point2) -> bool {
        let d = [b[0] - a[0], b[1] - a[1]];
        let mut t0 = 0.0f32;
        let mut t1 = 1.0f32;
        for axis in 0..2 {
            let lo = self.center[axis] - self.half_size[axis];
            let hi = self.center[axis] + self.half_size[axis];
            if d[axis].abs() < 1e-9 {
                if a[axis] < lo || a[axis] > hi {
                    return false;
                }
                continue;
            }
            let mut ta = (lo - a[axis]) / d[axis];
            let mut tb = (hi - a[axis]) / d[axis];
            if ta > tb {
                std::mem::swap(&mut ta, &mut tb);
            }
            t0 = t0.max(ta);
            t1 = t1.min(tb);
            if t0 > t1 {
                return false;
            }
        }
        true
    }

    /// Distance from `p` to the box (0 inside).
    pub fn distance_to(&self, p: Point2) -> f32 {
        let dx = ((p[0] - self.center[0]).abs() - self.half_size[0]).max(0.0);
        let dy = ((p[1] - self.center[1]).abs() - self.half_size[1]).max(0.0);
        (dx * dx + dy * dy).sqrt()
    }
}

/// Obstacles inside the half-plane `x ∈ [-extent, extent], y ∈ [0, extent]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    extent: f32,
    obstacles: Vec<Obstacle>,
}

impl Workspace {
    pub fn new(extent: f32, obstacles: Vec<Obstacle>) -> Self {
        Self { extent, obstacles }
    }

    pub fn empty(extent: f32) -> Self {
        Self::new(extent, Vec::new())
    }

    /// Random layout; obstacles never cover the base.
    pub fn random<R: Rng>(config: &ArmConfig, rng: &mut R) -> Self {
        let extent = config.extent();
        let count = rng.gen_range(0..=config.max_obstacles);
        let mut obstacles = Vec::with_capacity(count);
        let mut attempts = 0;
        while obstacles.len() < count && attempts < 50 * (count + 1) {
            attempts += 1;
            let half_size = [
                rng.gen_range(config.min_obstacle_size..=config.max_obstacle_size) / 2.0,
                rng.gen_range(config.min_obstacle_size..=config.max_obstacle_size) / 2.0,
            ];
            let center = [rng.gen_range(-extent..=extent), rng.gen_range(0.0..=extent)];
            let obstacle = Obstacle::new(center, half_size);
            if obstacle.distance_to([0.0, 0.0]) > config.base_clearance {
                obstacles.push(obstacle);
            }
        }
        Self { extent, obstacles }
    }

    pub fn extent(&self) -> f32 {
        self.extent
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Whether the polyline through `points` touches an obstacle or leaves
    /// the half plane.
    pub fn collides(&self, points: &[Point2]) -> bool {
        if points.iter().skip(1).any(|p| p[1] < 0.0) {
            return true;
        }
        points.windows(2).any(|link| {
            self.obstacles
                .iter()
                .any(|o| o.intersects_segment(link[0], link[1]))
        })
    }

    /// Occupancy image, row 0 at the top (`y = extent`); 1.0 marks an
    /// obstacle at the pixel center.
    pub fn rasterize(&self, width: usize, height: usize) -> WorkspaceImage {
        let mut pixels = vec![0.0f32; width * height];
        let cell_w = 2.0 * self.extent / width as f32;
        let cell_h = self.extent / height as f32;
        for row in 0..height {
            let y = self.extent - (row as f32 + 0.5) * cell_h;
            for col in 0..width {
                let x = -self.extent + (col as f32 + 0.5) * cell_w;
                if self.obstacles.iter().any(|o| o.contains([x, y])) {
                    pixels[row * width + col] = 1.0;
                }
            }
        }
        WorkspaceImage::new(width, height, pixels)
            .unwrap_or_else(|_| WorkspaceImage::empty(width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn unit_box() -> Obstacle {
        Obstacle::new([0.5, 0.5], [0.1, 0.1])
    }

    #[test]
    fn test_contains() {
        let o = unit_box();
        assert!(o.contains([0.5, 0.5]));
        assert!(o.contains([0.59, 0.41]));
        assert!(!o.contains([0.7, 0.5]));
    }

    #[test]
    fn test_segment_intersection() {
        let o = unit_box();
        assert!(o.intersects_segment([0.0, 0.5], [1.0, 0.5]));
        assert!(o.intersects_segment([0.5, 0.5], [0.55, 0.55]));
        assert!(!o.intersects_segment([0.0, 0.0], [1.0, 0.0]));
        assert!(!o.intersects_segment([0.0, 0.5], [0.3, 0.5]));
        assert!(o.intersects_segment([0.3, 0.3], [0.7, 0.7]));
        // vertical segment beside the box
        assert!(!o.intersects_segment([0.7, 0.0], [0.7, 1.0]));
    }

    #[test]
    fn test_collides() {
        let ws = Workspace::new(1.0, vec![unit_box()]);
        assert!(ws.collides(&[[0.0, 0.0], [0.0, 0.5], [1.0, 0.5]]));
        assert!(!ws.collides(&[[0.0, 0.0], [0.0, 0.9]]));
        // below the table
        assert!(ws.collides(&[[0.0, 0.0], [0.0, -0.1]]));
    }

    #[test]
    fn test_rasterize() {
        let ws = Workspace::new(1.0, vec![Obstacle::new([0.5, 0.5], [0.5, 0.5])]);
        let image = ws.rasterize(4, 2);
        // Right half of the top and bottom rows: x ∈ [0, 1], y ∈ [0, 1].
        assert_eq!(image.pixels(), &[0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0]);
        assert!((image.occupancy() - 0.5).abs() < 1e-6);

        assert_eq!(Workspace::empty(1.0).rasterize(4, 2).occupancy(), 0.0);
    }

    #[test]
    fn test_random_keeps_base_clear() {
        let config = ArmConfig::default().with_max_obstacles(5);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let ws = Workspace::random(&config, &mut rng);
            assert!(ws.obstacles().len() <= 5);
            assert!(ws
                .obstacles()
                .iter()
                .all(|o| o.distance_to([0.0, 0.0]) > config.base_clearance));
        }
    }
}
