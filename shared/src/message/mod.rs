//! 实时推送消息类型定义
//!
//! 这些类型在后端推送通道和客户端订单账本之间共享。
//! 一条推送要么是整个账本快照，要么是单个订单的增量更新。

use crate::models::{LedgerView, Order};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 推送载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum LedgerUpdate {
    /// 全量快照：整体替换两个分桶
    Snapshot(LedgerView),
    /// 增量：单个订单的最新状态
    Order(Order),
}

impl LedgerUpdate {
    pub fn is_snapshot(&self) -> bool {
        matches!(self, LedgerUpdate::Snapshot(_))
    }
}

/// 账本推送消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerMessage {
    /// 用于消息追踪
    pub message_id: Uuid,
    /// 每个 owner 单调递增的推送序号 (用于检测缺口)
    pub sequence: u64,
    /// 推送目标用户
    pub owner_id: String,
    pub update: LedgerUpdate,
}

impl LedgerMessage {
    pub fn new(owner_id: impl Into<String>, sequence: u64, update: LedgerUpdate) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            sequence,
            owner_id: owner_id.into(),
            update,
        }
    }

    /// 创建快照消息
    pub fn snapshot(owner_id: impl Into<String>, sequence: u64, view: LedgerView) -> Self {
        Self::new(owner_id, sequence, LedgerUpdate::Snapshot(view))
    }

    /// 创建增量消息
    pub fn order(owner_id: impl Into<String>, sequence: u64, order: Order) -> Self {
        Self::new(owner_id, sequence, LedgerUpdate::Order(order))
    }

    /// 序列化为二进制
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// 从二进制解析
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
