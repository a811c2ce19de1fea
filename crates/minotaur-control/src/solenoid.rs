//! 螺线管模型
//!
//! 四个线圈固定在场景中心的上、下、左、右，距中心 `separation`，
//! 线圈轴线指向中心。单个线圈在 SAM 处产生的磁场：
//!
//! ```text
//! B_i = I_i · a_i(x, y) · ŵ_i
//! ```
//!
//! 其中 `ŵ_i` 为 SAM 指向线圈的单位向量，`(x, y)` 为 SAM 在线圈局部
//! 坐标系中的位置（x 沿轴线，y 为横向偏移），`a` 为有限长螺线管的
//! 场系数。正电流把 SAM 拉向线圈。

use crate::geometry::Vector2f;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

/// 真空磁导率 (H/m)
pub const MU_0: f64 = 4.0 * PI * 1e-7;

/// SAM 与线圈重合的判定距离 (m)
pub const COINCIDENT_DISTANCE: f64 = 1e-9;

/// 线圈几何与材料参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoilGeometry {
    /// 线圈到中心的距离 L (m)
    pub separation: f64,
    /// 线圈半径 R (m)
    pub coil_radius: f64,
    /// 匝数 n
    pub turns: u32,
    /// 线圈长度 l (m)
    pub coil_length: f64,
    /// 相对磁导率 μr
    pub permeability: f64,
}

impl Default for CoilGeometry {
    fn default() -> Self {
        Self {
            separation: 0.3,
            coil_radius: 0.03,
            turns: 10,
            coil_length: 0.08,
            permeability: 1e4,
        }
    }
}

/// 线圈槽位
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CoilSlot {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl CoilSlot {
    pub const ALL: [CoilSlot; 4] = [CoilSlot::Up, CoilSlot::Down, CoilSlot::Left, CoilSlot::Right];

    pub fn index(self) -> usize {
        u8::from(self) as usize
    }

    /// 相对中心的单位方位
    fn unit_position(self) -> Vector2f {
        match self {
            CoilSlot::Up => Vector2f::new(0.0, 1.0),
            CoilSlot::Down => Vector2f::new(0.0, -1.0),
            CoilSlot::Left => Vector2f::new(-1.0, 0.0),
            CoilSlot::Right => Vector2f::new(1.0, 0.0),
        }
    }

    /// 线圈朝向角 (rad)，轴线方向为 (-sin θ, cos θ)
    fn angle(self) -> f64 {
        match self {
            CoilSlot::Up => PI,
            CoilSlot::Down => 0.0,
            CoilSlot::Left => -FRAC_PI_2,
            CoilSlot::Right => FRAC_PI_2,
        }
    }
}

/// 单个螺线管
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solenoid {
    pub slot: CoilSlot,
    /// 相对场景中心的位置 (m)
    pub position: Vector2f,
    /// 朝向角 (rad)
    pub angle: f64,
    pub turns: u32,
    pub radius: f64,
    pub length: f64,
    pub permeability: f64,
    /// 实时电流 (A)
    pub current: f64,
}

impl Solenoid {
    pub fn new(slot: CoilSlot, geometry: &CoilGeometry) -> Self {
        Self {
            slot,
            position: slot.unit_position() * geometry.separation,
            angle: slot.angle(),
            turns: geometry.turns,
            radius: geometry.coil_radius,
            length: geometry.coil_length,
            permeability: geometry.permeability,
            current: 0.0,
        }
    }

    /// 固定的四线圈布置，按 [`CoilSlot`] 顺序
    pub fn arrangement(geometry: &CoilGeometry) -> [Solenoid; 4] {
        CoilSlot::ALL.map(|slot| Solenoid::new(slot, geometry))
    }

    /// 线圈轴线（单位向量）
    pub fn axis(&self) -> Vector2f {
        Vector2f::new(-self.angle.sin(), self.angle.cos())
    }

    /// 局部坐标系中的场系数 a(x, y)
    pub fn coefficient(&self, x: f64, y: f64) -> f64 {
        let half = self.length / 2.0;
        let r2 = self.radius * self.radius + y * y;
        let near = (x + half) / ((x + half).powi(2) + r2).sqrt();
        let far = (x - half) / ((x - half).powi(2) + r2).sqrt();
        MU_0 * self.permeability * self.turns as f64 / (2.0 * self.length) * (near - far)
    }

    /// 世界坐标转线圈局部坐标
    pub fn local(&self, point: Vector2f) -> Vector2f {
        let d = point - self.position;
        let axis = self.axis();
        Vector2f::new(d.dot(axis), axis.cross(d))
    }

    /// 单位电流在 `point` 处产生的场（a · ŵ）
    ///
    /// SAM 与线圈重合时方向无定义，返回 `None`。
    pub fn unit_field(&self, point: Vector2f) -> Option<Vector2f> {
        let to_coil = self.position - point;
        if to_coil.norm() < COINCIDENT_DISTANCE {
            return None;
        }
        let w = to_coil.normalized()?;
        let local = self.local(point);
        Some(w * self.coefficient(local.x, local.y))
    }

    /// 当前电流在 `point` 处产生的场
    pub fn field_at(&self, point: Vector2f) -> Vector2f {
        self.unit_field(point)
            .map(|f| f * self.current)
            .unwrap_or(Vector2f::ZERO)
    }
}

/// 四个线圈在 `point` 处的合场
pub fn total_field(solenoids: &[Solenoid], point: Vector2f) -> Vector2f {
    solenoids
        .iter()
        .fold(Vector2f::ZERO, |acc, s| acc + s.field_at(point))
}
