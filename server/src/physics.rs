use crate::store::Fighter;
use shared::{FIGHTER_SPEED, WORLD_RADIUS};

///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector2 {
    ///Value along the x-axis.
    pub x: f32,
    ///Value along the y-axis.
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Vector2 { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector.
    pub fn normalize(&self) -> Vector2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vector2::ZERO
        } else {
            self.scale(1.0 / mag)
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    ///Returns `self - other`.
    pub fn sub(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

///Moves a fighter toward its target for `dt` seconds.
///
///While the remaining distance is larger than one step the fighter travels at
///[`FIGHTER_SPEED`]. Once it is within reach the raw offset is scaled by `dt`
///instead, so the fighter creeps up on the target rather than snapping onto it.
///The result is always clamped back onto the world disk.
pub fn step_fighter(fighter: &mut Fighter, dt: f32) {
    let mut delta = fighter.target.sub(&fighter.position);
    let distance = delta.magnitude();
    let reach = FIGHTER_SPEED * dt;

    if distance > reach {
        delta = delta.scale(FIGHTER_SPEED / distance);
    }

    fighter.position = fighter.position.add(&delta.scale(dt));

    let radius = fighter.position.magnitude();
    if radius > WORLD_RADIUS {
        fighter.position = fighter.position.scale(WORLD_RADIUS / radius);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn fighter_at(position: Vector2, target: Vector2) -> Fighter {
        let mut fighter = Fighter::spawn(position);
        fighter.target = target;
        fighter
    }

    #[test]
    fn test_vector_helpers() {
        let v = Vector2::new(3.0, 4.0);
        assert_eq!(v.magnitude(), 5.0);

        let n = v.normalize();
        assert_approx_eq!(n.x, 0.6);
        assert_approx_eq!(n.y, 0.8);

        assert_eq!(Vector2::ZERO.normalize(), Vector2::ZERO);
        assert_eq!(v.sub(&Vector2::new(1.0, 1.0)), Vector2::new(2.0, 3.0));
    }

    #[test]
    fn test_moves_at_unit_speed_toward_target() {
        let mut fighter = fighter_at(Vector2::ZERO, Vector2::new(1.0, 0.0));

        step_fighter(&mut fighter, 0.1);

        assert_approx_eq!(fighter.position.x, 0.1);
        assert_approx_eq!(fighter.position.y, 0.0);
    }

    #[test]
    fn test_near_target_uses_unnormalized_offset() {
        let mut fighter = fighter_at(Vector2::ZERO, Vector2::new(0.05, 0.0));

        step_fighter(&mut fighter, 0.1);

        // 0.05 * 0.1, not a snap onto the target
        assert_approx_eq!(fighter.position.x, 0.005);
    }

    #[test]
    fn test_standing_on_target_does_not_move() {
        let mut fighter = fighter_at(Vector2::new(0.3, 0.3), Vector2::new(0.3, 0.3));

        step_fighter(&mut fighter, 0.5);

        assert_eq!(fighter.position, Vector2::new(0.3, 0.3));
    }

    #[test]
    fn test_converges_monotonically() {
        let target = Vector2::new(0.0, 0.5);
        let mut fighter = fighter_at(Vector2::ZERO, target);
        let mut previous = target.sub(&fighter.position).magnitude();

        for _ in 0..50 {
            step_fighter(&mut fighter, 0.1);
            let remaining = target.sub(&fighter.position).magnitude();
            assert!(remaining <= previous + 1e-6);
            assert!(fighter.position.magnitude() <= WORLD_RADIUS + 1e-6);
            previous = remaining;
        }

        assert!(previous < 0.1);
    }

    #[test]
    fn test_clamped_to_world_disk() {
        let mut fighter = fighter_at(Vector2::new(0.95, 0.0), Vector2::new(5.0, 5.0));

        for _ in 0..30 {
            step_fighter(&mut fighter, 0.2);
            assert!(fighter.position.magnitude() <= WORLD_RADIUS + 1e-5);
        }

        assert_approx_eq!(fighter.position.magnitude(), WORLD_RADIUS, 1e-5);
    }

    #[test]
    fn test_target_outside_disk_is_clamped_every_step() {
        let targets = [
            Vector2::new(-3.0, 0.0),
            Vector2::new(0.0, 7.5),
            Vector2::new(2.0, -2.0),
            Vector2::new(0.2, 0.1),
        ];
        let mut fighter = fighter_at(Vector2::ZERO, Vector2::ZERO);

        for target in targets {
            fighter.target = target;
            for _ in 0..20 {
                step_fighter(&mut fighter, 1.0 / 30.0);
                assert!(fighter.position.magnitude() <= WORLD_RADIUS + 1e-5);
            }
        }
    }
}
