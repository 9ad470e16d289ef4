
use crate::{Pool, RefCount, Referenceable};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// 测试用负载：记录自身是否已被回收，用于检测"持有期间被回收"
pub(crate) struct MockPayload {
    ref_count: RefCount,
    pub(crate) id: u64,
    pub(crate) recycled: AtomicBool,
    pub(crate) content: Vec<u8>,
}

unsafe impl Referenceable for MockPayload {
    fn ref_count(&self) -> &RefCount {
        &self.ref_count
    }
}

impl MockPayload {
    /// 标记为"正在使用"，写入者在发布前调用
    pub(crate) fn mark_live(&mut self) {
        *self.recycled.get_mut() = false;
    }

    /// 用 `id` 填充内容，读者据此检查看到的是完整版本
    pub(crate) fn fill(&mut self, id: u64, len: usize) {
        self.id = id;
        self.content.clear();
        self.content.resize(len, id as u8);
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.content.iter().all(|b| *b == self.id as u8)
    }
}

/// 创建一个 mock 池：工厂分配递增 id，重置时设置 recycled 标记并清空内容
pub(crate) fn new_mock_pool() -> Pool<MockPayload> {
    let next_id = AtomicU64::new(0);
    Pool::new(
        move || MockPayload {
            ref_count: RefCount::new(),
            id: next_id.fetch_add(1, Ordering::Relaxed) + 1,
            recycled: AtomicBool::new(false),
            content: Vec::with_capacity(16),
        },
        |obj| {
            obj.recycled.store(true, Ordering::Release);
            obj.content.clear();
            true
        },
    )
}

/// 创建一个统计重置次数的池；`reusable` 决定重置后是否放回空闲列表
pub(crate) fn counting_pool(reusable: bool) -> (Pool<MockPayload>, Arc<AtomicUsize>) {
    let resets = Arc::new(AtomicUsize::new(0));
    let resets_clone = resets.clone();
    let pool = Pool::new(
        || MockPayload {
            ref_count: RefCount::new(),
            id: 0,
            recycled: AtomicBool::new(false),
            content: Vec::new(),
        },
        move |obj| {
            resets_clone.fetch_add(1, Ordering::SeqCst);
            obj.recycled.store(true, Ordering::Release);
            obj.content.clear();
            reusable
        },
    );
    (pool, resets)
}
