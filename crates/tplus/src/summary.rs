//! Human-readable run output for stdout.

use std::fmt::Write as _;
use std::time::Duration;

use tplus_models::ResultRecord;

pub fn render_record(record: &ResultRecord) -> String {
    let mut out = String::new();
    match record {
        ResultRecord::Failed(r) => {
            let _ = write!(out, "股票 {} ({}) 分析失败: {}", r.name, r.code, r.error);
        }
        ResultRecord::Analyzed(r) => {
            let rec = &r.recommendation;
            let _ = writeln!(out, "=== {} ({}) ===", r.name, r.code);
            let _ = writeln!(out, "分析时间: {}  模式: {}", r.analysis_date, r.mode);
            let _ = writeln!(out, "当前价格: {}", r.current_price);
            let _ = writeln!(out, "涨跌幅: {}%", r.change_percent);
            let _ = writeln!(out, "建议: {}", rec.action.label());
            let _ = writeln!(out, "预测价格(T+1): {}", rec.predicted_price);
            let _ = writeln!(out, "预测买入价: {}", rec.predicted_buy_price);
            let _ = writeln!(out, "预测卖出价: {}", rec.predicted_sell_price);
            let _ = writeln!(out, "信心度: {}", rec.confidence);
            let _ = write!(out, "推荐原因: {}", rec.reason);
        }
    }
    out
}

pub fn completion_banner(records: &[ResultRecord], elapsed: Duration) -> String {
    let failed = records.iter().filter(|r| r.is_failed()).count();
    format!(
        "分析结束: 共 {} 只, 成功 {}, 失败 {}, 用时 {:.1}s",
        records.len(),
        records.len() - failed,
        failed,
        elapsed.as_secs_f64()
    )
}
