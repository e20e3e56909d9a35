//! 投票收集 - 状态层
//!
//! 与上传会话相互独立的第二套按用户状态机：
//! 逐条接收测验投票事件并累积为题目列表。
//! 显式开始、可清空但不结束、显式停止，永不自动过期

use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::Question;

/// 单用户的收集状态
#[derive(Debug, Default)]
struct Collection {
    questions: Vec<Question>,
    /// 实时更新计数用的状态消息 ID
    status_message_id: Option<i64>,
}

/// 投票收集器
#[derive(Debug, Default)]
pub struct PollCollector {
    collections: Mutex<HashMap<i64, Collection>>,
}

impl PollCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用户是否处于收集模式
    pub fn is_collecting(&self, owner_id: i64) -> bool {
        self.collections.lock().unwrap().contains_key(&owner_id)
    }

    /// 开始收集（已在收集中则不变）
    pub fn start(&self, owner_id: i64) {
        self.collections
            .lock()
            .unwrap()
            .entry(owner_id)
            .or_default();
    }

    /// 停止收集并销毁状态
    pub fn stop(&self, owner_id: i64) {
        self.collections.lock().unwrap().remove(&owner_id);
    }

    /// 追加一条题目，返回当前累积数量
    ///
    /// 未在收集模式时返回 0，不做任何修改
    pub fn add(&self, owner_id: i64, question: Question) -> usize {
        let mut collections = self.collections.lock().unwrap();
        match collections.get_mut(&owner_id) {
            Some(collection) => {
                collection.questions.push(question);
                collection.questions.len()
            }
            None => 0,
        }
    }

    /// 当前累积数量
    pub fn count(&self, owner_id: i64) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(&owner_id)
            .map(|c| c.questions.len())
            .unwrap_or(0)
    }

    /// 取得已收集题目的副本
    pub fn questions(&self, owner_id: i64) -> Vec<Question> {
        self.collections
            .lock()
            .unwrap()
            .get(&owner_id)
            .map(|c| c.questions.clone())
            .unwrap_or_default()
    }

    /// 清空已收集题目，但保持收集模式
    pub fn clear(&self, owner_id: i64) {
        if let Some(collection) = self.collections.lock().unwrap().get_mut(&owner_id) {
            collection.questions.clear();
        }
    }

    /// 记录状态消息 ID（用于原地编辑计数）
    pub fn set_status_message(&self, owner_id: i64, message_id: i64) {
        if let Some(collection) = self.collections.lock().unwrap().get_mut(&owner_id) {
            collection.status_message_id = Some(message_id);
        }
    }

    /// 读取状态消息 ID
    pub fn status_message(&self, owner_id: i64) -> Option<i64> {
        self.collections
            .lock()
            .unwrap()
            .get(&owner_id)
            .and_then(|c| c.status_message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(text: &str) -> Question {
        Question::new(text, vec!["A".into(), "B".into()], 0)
    }

    #[test]
    fn add_outside_collection_mode_is_noop() {
        let collector = PollCollector::new();
        assert_eq!(collector.add(1, question("q")), 0);
        assert!(!collector.is_collecting(1));
    }

    #[test]
    fn collect_count_and_stop() {
        let collector = PollCollector::new();
        collector.start(1);
        assert!(collector.is_collecting(1));

        assert_eq!(collector.add(1, question("第一题")), 1);
        assert_eq!(collector.add(1, question("第二题")), 2);
        assert_eq!(collector.count(1), 2);
        assert_eq!(collector.questions(1).len(), 2);

        collector.stop(1);
        assert!(!collector.is_collecting(1));
        assert_eq!(collector.count(1), 0);
    }

    #[test]
    fn clear_keeps_collection_active() {
        let collector = PollCollector::new();
        collector.start(1);
        collector.add(1, question("q"));

        collector.clear(1);
        assert!(collector.is_collecting(1));
        assert_eq!(collector.count(1), 0);
        // 清空后可继续收集
        assert_eq!(collector.add(1, question("q2")), 1);
    }

    #[test]
    fn status_message_tracks_per_owner() {
        let collector = PollCollector::new();
        collector.start(1);
        collector.set_status_message(1, 555);
        assert_eq!(collector.status_message(1), Some(555));

        // 未开始收集的用户无法记录状态消息
        collector.set_status_message(2, 777);
        assert_eq!(collector.status_message(2), None);

        collector.stop(1);
        assert_eq!(collector.status_message(1), None);
    }

    #[test]
    fn start_twice_preserves_existing_questions() {
        let collector = PollCollector::new();
        collector.start(1);
        collector.add(1, question("q"));
        collector.start(1);
        assert_eq!(collector.count(1), 1);
    }
}
