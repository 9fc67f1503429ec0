//! System roles and user prompts for every model call.
//!
//! Each stage prompt embeds only the data that stage needs. The decision and
//! single-shot prompts end with the same response-format block so the parser
//! sees one field vocabulary.

use std::fmt::Write as _;

use tplus_models::{EntityProfile, HistoryBar, MarketSnapshot};

pub const SINGLE_SHOT_ROLE: &str =
    "你是一名专业的A股分析师，依据行情快照、近期日线和公司基本资料给出次日（T+1）交易判断。";

pub const FUNDAMENTAL_ROLE: &str =
    "你是一名A股基本面分析师，专长于财务质量、行业格局与估值水平的评估。";

pub const TECHNICAL_ROLE: &str =
    "你是一名A股技术分析师，专长于量价关系、趋势结构与常用技术指标的解读。";

pub const TRADER_ROLE: &str =
    "你是一名短线交易员，专长于结合研究结论制定仓位、止损与止盈计划。";

pub const DECISION_ROLE: &str =
    "你是投资决策委员会主席，负责汇总各方意见并给出唯一的最终交易决定。";

/// Field labels the parser understands, in the order the model should emit them.
fn response_format() -> &'static str {
    "只输出一个JSON对象，不要附加其他文字，字段如下：\n\
     - 建议：买入 / 卖出 / 保持\n\
     - 推荐原因：一句话说明\n\
     - 动作：买 / 卖 / 保持\n\
     - 预测价格：T+1收盘价预测（数字）\n\
     - 预测买入价格：T+1建议买入价（数字）\n\
     - 预测卖出价格：T+1建议卖出价（数字）\n\
     - 预测信心：0到1之间的小数"
}

fn profile_block(out: &mut String, snapshot: &MarketSnapshot, profile: &EntityProfile) {
    let _ = writeln!(out, "【基本资料】");
    let _ = writeln!(out, "代码：{}", snapshot.code);
    let _ = writeln!(out, "名称：{}", snapshot.name);
    let _ = writeln!(out, "所属行业：{}", profile.sector_or_unknown());
    let _ = writeln!(out, "上市日期：{}", profile.ipo_date);
    let _ = writeln!(out, "总市值（亿元）：{}", snapshot.total_market_value);
    let _ = writeln!(out, "流通市值（亿元）：{}", snapshot.circulating_market_value);
    let _ = writeln!(out, "市盈率：{}", snapshot.pe_ratio);
    let _ = writeln!(out, "市净率：{}", snapshot.pb_ratio);
}

fn quote_block(out: &mut String, snapshot: &MarketSnapshot) {
    let _ = writeln!(out, "【实时行情】");
    let _ = writeln!(out, "现价：{}", snapshot.current_price);
    let _ = writeln!(out, "涨跌幅：{}%", snapshot.change_percent);
    let _ = writeln!(
        out,
        "开/高/低：{} / {} / {}",
        snapshot.open, snapshot.high, snapshot.low
    );
    let _ = writeln!(out, "成交量（手）：{}", snapshot.volume_hand);
    let _ = writeln!(out, "换手率：{}%", snapshot.turnover_rate);
}

/// One line per bar, newest first, at most `bars` lines.
fn history_lines(out: &mut String, history: &[HistoryBar], bars: usize, detailed: bool) {
    for bar in history.iter().take(bars) {
        if detailed {
            let _ = writeln!(
                out,
                "{} 开{:.2} 高{:.2} 低{:.2} 收{:.2} 量{} 涨跌{}%",
                bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume, bar.pct_chg
            );
        } else {
            let _ = writeln!(
                out,
                "{} 收{:.2} 涨跌{}% 量{}",
                bar.date, bar.close, bar.pct_chg, bar.volume
            );
        }
    }
}

pub fn single_shot_prompt(
    snapshot: &MarketSnapshot,
    history: &[HistoryBar],
    profile: &EntityProfile,
    bars: usize,
) -> String {
    let mut out = String::from("请对下面这只股票做T+1交易分析。\n\n");
    profile_block(&mut out, snapshot, profile);
    out.push('\n');
    quote_block(&mut out, snapshot);
    let shown = bars.min(history.len());
    let _ = writeln!(out, "\n【最近{shown}个交易日】");
    history_lines(&mut out, history, bars, false);
    out.push('\n');
    out.push_str(response_format());
    out
}

pub fn fundamental_prompt(snapshot: &MarketSnapshot, profile: &EntityProfile) -> String {
    let mut out = String::from("请从基本面角度评估下面这只股票。\n\n");
    profile_block(&mut out, snapshot, profile);
    out.push_str(
        "\n请覆盖：盈利能力与财务稳健性；行业位置与竞争壁垒；当前估值是否合理；中长期配置价值。\n",
    );
    out
}

/// `history` is already cut to the bars the technical stage may see.
pub fn technical_prompt(snapshot: &MarketSnapshot, history: &[HistoryBar]) -> String {
    let mut out = String::from("请从技术面角度评估下面这只股票。\n\n");
    quote_block(&mut out, snapshot);
    let _ = writeln!(out, "\n【最近{}个交易日】", history.len());
    history_lines(&mut out, history, history.len(), true);
    out.push_str(
        "\n请覆盖：趋势方向与关键支撑阻力；量能变化与资金动向；均线、MACD、RSI等信号；短线机会与风险。\n",
    );
    out
}

pub fn trader_prompt(fundamental: &str, technical: &str) -> String {
    format!(
        "以下是两位分析师的报告，请据此制定具体交易计划。\n\n\
         【基本面报告】\n{fundamental}\n\n\
         【技术面报告】\n{technical}\n\n\
         请说明：风险收益比；市场情绪与资金环境；入场时机与仓位；止损止盈位置。\n"
    )
}

pub fn decision_prompt(fundamental: &str, technical: &str, trader: &str) -> String {
    format!(
        "请综合以下三份意见，给出这只股票的T+1最终决定。\n\n\
         【基本面报告】\n{fundamental}\n\n\
         【技术面报告】\n{technical}\n\n\
         【交易员计划】\n{trader}\n\n{}",
        response_format()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tplus_data::test_support::{sample_bars, sample_profile, sample_snapshot};

    fn fixtures() -> (MarketSnapshot, Vec<HistoryBar>, EntityProfile) {
        let last = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        (
            sample_snapshot("600000", 7.2),
            sample_bars("sh600000", last, 20, 7.0),
            sample_profile("600000"),
        )
    }

    #[test]
    fn single_shot_limits_history() {
        let (snap, bars, profile) = fixtures();
        let prompt = single_shot_prompt(&snap, &bars, &profile, 3);
        assert!(prompt.contains("最近3个交易日"));
        assert!(prompt.contains("2024-03-08"));
        assert!(prompt.contains("2024-03-06"));
        assert!(!prompt.contains("2024-03-05"));
        assert!(prompt.contains("预测信心"));
        assert!(prompt.contains("银行"));
    }

    #[test]
    fn single_shot_with_short_history() {
        let (snap, bars, profile) = fixtures();
        let prompt = single_shot_prompt(&snap, &bars[..2], &profile, 10);
        assert!(prompt.contains("最近2个交易日"));
    }

    #[test]
    fn unknown_sector_label() {
        let (snap, _, mut profile) = fixtures();
        profile.sector = None;
        assert!(fundamental_prompt(&snap, &profile).contains("所属行业：未知"));
    }

    #[test]
    fn market_cap_labelled_in_yi() {
        let (snap, _, profile) = fixtures();
        let prompt = fundamental_prompt(&snap, &profile);
        assert!(prompt.contains("总市值（亿元）：2113.37"));
        assert!(prompt.contains("流通市值（亿元）：2113.37"));
    }

    #[test]
    fn technical_shows_every_given_bar() {
        let (snap, bars, _) = fixtures();
        let prompt = technical_prompt(&snap, &bars[..15]);
        assert!(prompt.contains("最近15个交易日"));
        assert_eq!(prompt.matches(" 开").count(), 15);
    }

    #[test]
    fn decision_threads_all_reports() {
        let prompt = decision_prompt("基本面A", "技术面B", "交易C");
        assert!(prompt.contains("基本面A"));
        assert!(prompt.contains("技术面B"));
        assert!(prompt.contains("交易C"));
        assert!(prompt.contains("JSON"));
    }

    #[test]
    fn trader_sees_both_reports() {
        let prompt = trader_prompt("基本面A", "技术面B");
        assert!(prompt.contains("基本面A") && prompt.contains("技术面B"));
        assert!(!prompt.contains("JSON"));
    }
}
