//! 二维向量与方向
//!
//! 场景坐标系：原点为场景中心，x 向右，y 向上，单位为米。

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// 二维向量
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2<T> {
    pub x: T,
    pub y: T,
}

/// 整数向量（方向、步数）
pub type Vector2i = Vector2<i32>;

/// 浮点向量（位置、速度、力、电流）
pub type Vector2f = Vector2<f64>;

impl<T> Vector2<T> {
    pub const fn new(x: T, y: T) -> Self {
        Self { x, y }
    }
}

impl<T: Add<Output = T>> Add for Vector2<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl<T: Sub<Output = T>> Sub for Vector2<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl<T: Neg<Output = T>> Neg for Vector2<T> {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl<T: Mul<Output = T> + Copy> Mul<T> for Vector2<T> {
    type Output = Self;

    fn mul(self, rhs: T) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl<T: AddAssign> AddAssign for Vector2<T> {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl<T: SubAssign> SubAssign for Vector2<T> {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Vector2i {
    pub const ZERO: Self = Self::new(0, 0);

    pub fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0
    }

    pub fn to_f64(self) -> Vector2f {
        Vector2f::new(self.x as f64, self.y as f64)
    }
}

impl Vector2f {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y
    }

    /// 二维叉积（z 分量）
    pub fn cross(self, rhs: Self) -> f64 {
        self.x * rhs.y - self.y * rhs.x
    }

    pub fn norm(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// 单位向量，长度为零时返回 `None`
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if n > f64::EPSILON && n.is_finite() {
            Some(self * (1.0 / n))
        } else {
            None
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// 运动方向
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Direction {
    /// y > 0
    Up = 0,
    /// y < 0
    Down = 1,
    /// x > 0
    Right = 2,
    /// x < 0
    Left = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Right,
        Direction::Left,
    ];

    /// 单位向量（恰有一个非零分量）
    pub fn to_vector(self) -> Vector2i {
        match self {
            Direction::Up => Vector2i::new(0, 1),
            Direction::Down => Vector2i::new(0, -1),
            Direction::Right => Vector2i::new(1, 0),
            Direction::Left => Vector2i::new(-1, 0),
        }
    }

    /// 从原始整数解析
    pub fn from_raw(raw: i32) -> Option<Self> {
        u8::try_from(raw).ok().and_then(|v| Direction::try_from(v).ok())
    }
}

/// 将原始方向值转换为向量
///
/// 非法值记录 error 日志并返回零向量，不会 panic。
pub fn direction_vector(raw: i32) -> Vector2i {
    match Direction::from_raw(raw) {
        Some(dir) => dir.to_vector(),
        None => {
            tracing::error!("Invalid direction specified for movement: {}", raw);
            Vector2i::ZERO
        },
    }
}

/// 坐标轴
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Axis {
    X = 0,
    Y = 1,
}

impl Axis {
    pub fn from_raw(raw: i32) -> Option<Self> {
        u8::try_from(raw).ok().and_then(|v| Axis::try_from(v).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_unit_vectors() {
        for dir in Direction::ALL {
            let v = dir.to_vector();
            let nonzero = [v.x, v.y].iter().filter(|c| **c != 0).count();
            assert_eq!(nonzero, 1, "{:?} -> {:?}", dir, v);
            assert_eq!(v.x.abs() + v.y.abs(), 1);
        }
        assert_eq!(Direction::Up.to_vector(), Vector2i::new(0, 1));
        assert_eq!(Direction::Down.to_vector(), Vector2i::new(0, -1));
        assert_eq!(Direction::Right.to_vector(), Vector2i::new(1, 0));
        assert_eq!(Direction::Left.to_vector(), Vector2i::new(-1, 0));
    }

    #[test]
    fn test_direction_vector_raw() {
        assert_eq!(direction_vector(0), Vector2i::new(0, 1));
        assert_eq!(direction_vector(3), Vector2i::new(-1, 0));
        // 非法值：零向量，不 panic
        assert_eq!(direction_vector(4), Vector2i::ZERO);
        assert_eq!(direction_vector(-1), Vector2i::ZERO);
        assert_eq!(direction_vector(1000), Vector2i::ZERO);
    }

    #[test]
    fn test_axis_from_raw() {
        assert_eq!(Axis::from_raw(0), Some(Axis::X));
        assert_eq!(Axis::from_raw(1), Some(Axis::Y));
        assert_eq!(Axis::from_raw(2), None);
    }

    #[test]
    fn test_vector_ops() {
        let a = Vector2f::new(3.0, 4.0);
        let b = Vector2f::new(1.0, -2.0);
        assert_eq!(a + b, Vector2f::new(4.0, 2.0));
        assert_eq!(a - b, Vector2f::new(2.0, 6.0));
        assert_eq!(a * 2.0, Vector2f::new(6.0, 8.0));
        assert_eq!(-b, Vector2f::new(-1.0, 2.0));
        assert_eq!(a.norm(), 5.0);
        assert_eq!(a.dot(b), -5.0);
        assert_eq!(a.cross(b), -10.0);
    }

    #[test]
    fn test_normalized() {
        let v = Vector2f::new(0.0, 2.0).normalized().unwrap();
        assert_eq!(v, Vector2f::new(0.0, 1.0));
        assert!(Vector2f::ZERO.normalized().is_none());
    }

    #[test]
    fn test_integer_vector() {
        let v = Vector2i::new(2, -3) + Vector2i::new(1, 1);
        assert_eq!(v, Vector2i::new(3, -2));
        assert_eq!(v * 2, Vector2i::new(6, -4));
        assert_eq!(v.to_f64(), Vector2f::new(3.0, -2.0));
        assert!(Vector2i::ZERO.is_zero());
    }
}
