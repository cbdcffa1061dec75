// ==========================================
// 餐厅后台库存系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免"部分模块外键开启/部分不开启"
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 统一建表入口，测试与生产共用同一份 schema
// ==========================================

use rusqlite::Connection;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 库存核心的全部表结构
///
/// 说明：
/// - 日期时间统一以 RFC3339 文本存储（chrono 序列化口径）
/// - 数量/金额以 REAL 存储，与领域层 f64 对齐
/// - inventory_ledger.quantity 为入库原始数量，remaining_quantity 只会被
///   FIFO 消耗、解锁回补与盘点定向修正三条路径改写
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS stock_transaction (
  id TEXT PRIMARY KEY,
  transaction_code TEXT NOT NULL UNIQUE,
  kind TEXT NOT NULL CHECK(kind IN ('STOCK_IN', 'STOCK_OUT', 'ADJUSTMENT')),
  warehouse_id TEXT NOT NULL,
  supplier_id TEXT,
  customer_id TEXT,
  destination_warehouse_id TEXT,
  stock_in_type TEXT,
  stock_out_type TEXT,
  adjustment_type TEXT,
  related_transaction_id TEXT,
  reason TEXT,
  reference_number TEXT,
  notes TEXT,
  transaction_date TEXT NOT NULL,
  total_amount REAL NOT NULL DEFAULT 0,
  is_locked INTEGER NOT NULL DEFAULT 0,
  status TEXT NOT NULL DEFAULT 'ACTIVE',
  performed_by TEXT,
  created_by TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stock_transaction_item (
  id TEXT PRIMARY KEY,
  transaction_id TEXT NOT NULL REFERENCES stock_transaction(id),
  material_id TEXT NOT NULL,
  unit_id TEXT NOT NULL,
  quantity REAL NOT NULL,
  unit_price REAL,
  total_amount REAL,
  target_ledger_id TEXT,
  signed_delta REAL,
  notes TEXT,
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_txn_item_txn ON stock_transaction_item(transaction_id);

CREATE TABLE IF NOT EXISTS inventory_ledger (
  id TEXT PRIMARY KEY,
  warehouse_id TEXT NOT NULL,
  material_id TEXT NOT NULL,
  transaction_id TEXT NOT NULL REFERENCES stock_transaction(id),
  transaction_code TEXT NOT NULL,
  transaction_date TEXT NOT NULL,
  unit_id TEXT NOT NULL,
  unit_price REAL NOT NULL,
  quantity REAL NOT NULL,
  remaining_quantity REAL NOT NULL,
  status TEXT NOT NULL DEFAULT 'ACTIVE',
  batch_number TEXT,
  created_at TEXT NOT NULL,
  CHECK(remaining_quantity >= 0)
);
CREATE INDEX IF NOT EXISTS idx_ledger_wh_mat ON inventory_ledger(warehouse_id, material_id);
CREATE INDEX IF NOT EXISTS idx_ledger_txn ON inventory_ledger(transaction_id);

CREATE TABLE IF NOT EXISTS batch_mapping (
  id TEXT PRIMARY KEY,
  item_id TEXT NOT NULL REFERENCES stock_transaction_item(id),
  ledger_id TEXT NOT NULL REFERENCES inventory_ledger(id),
  quantity_used REAL NOT NULL CHECK(quantity_used > 0),
  unit_price REAL NOT NULL,
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_mapping_item ON batch_mapping(item_id);
CREATE INDEX IF NOT EXISTS idx_mapping_ledger ON batch_mapping(ledger_id);

CREATE TABLE IF NOT EXISTS inventory_count (
  id TEXT PRIMARY KEY,
  count_code TEXT NOT NULL UNIQUE,
  warehouse_id TEXT NOT NULL,
  count_date TEXT NOT NULL,
  count_status TEXT NOT NULL CHECK(count_status IN ('DRAFT', 'COMPLETED', 'CANCELLED')),
  adjustment_transaction_id TEXT,
  performed_by TEXT,
  created_by TEXT NOT NULL,
  notes TEXT,
  status TEXT NOT NULL DEFAULT 'ACTIVE',
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS inventory_count_item (
  id TEXT PRIMARY KEY,
  count_id TEXT NOT NULL REFERENCES inventory_count(id),
  material_id TEXT NOT NULL,
  unit_id TEXT NOT NULL,
  ledger_id TEXT NOT NULL REFERENCES inventory_ledger(id),
  batch_number TEXT,
  transaction_date TEXT NOT NULL,
  system_quantity REAL NOT NULL,
  actual_quantity REAL NOT NULL,
  difference_quantity REAL NOT NULL,
  notes TEXT,
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_count_item_count ON inventory_count_item(count_id);

CREATE TABLE IF NOT EXISTS unit_conversion (
  id TEXT PRIMARY KEY,
  from_unit_id TEXT NOT NULL,
  to_unit_id TEXT NOT NULL,
  factor REAL NOT NULL CHECK(factor > 0),
  status TEXT NOT NULL DEFAULT 'ACTIVE',
  created_by TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_by TEXT,
  updated_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_conversion_pair ON unit_conversion(from_unit_id, to_unit_id);

CREATE TABLE IF NOT EXISTS unit_conversion_history (
  id TEXT PRIMARY KEY,
  conversion_id TEXT NOT NULL,
  from_unit_id TEXT NOT NULL,
  to_unit_id TEXT NOT NULL,
  old_factor REAL,
  new_factor REAL,
  change_type TEXT NOT NULL,
  reason TEXT,
  changed_by TEXT NOT NULL,
  changed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS material_unit_group (
  id TEXT PRIMARY KEY,
  material_id TEXT NOT NULL,
  unit_id TEXT NOT NULL,
  is_base_unit INTEGER NOT NULL DEFAULT 0,
  status TEXT NOT NULL DEFAULT 'ACTIVE',
  created_by TEXT NOT NULL,
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_material_unit ON material_unit_group(material_id, unit_id);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 在连接上创建全部库存核心表（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

/// 打开连接并保证表结构就绪（测试与嵌入场景的快捷入口）
pub fn open_and_init(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}
