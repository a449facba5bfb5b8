#![no_main]

use chrono::NaiveDate;
use libfuzzer_sys::fuzz_target;
use rust_decimal::Decimal;
use vatcost::core::CurrencyCode;
use vatcost::rules::{EvaluationContext, RuleBuilder, RuleEvaluator, RuleType, vars};

fuzz_target!(|data: &[u8]| {
    let Ok(expression) = std::str::from_utf8(data) else {
        return;
    };
    let Some(from) = NaiveDate::from_ymd_opt(2024, 1, 1) else {
        return;
    };
    let Ok(rule) = RuleBuilder::new("GB", RuleType::VatRate, "fuzz", expression, from).build() else {
        return;
    };
    let Ok(currency) = CurrencyCode::parse("GBP") else {
        return;
    };
    let context = EvaluationContext::new(currency)
        .with_variable(vars::BASE_PRICE, Decimal::new(100_000, 2))
        .with_variable(vars::TRANSACTION_VOLUME, Decimal::from(250))
        .with_variable(vars::SERVICE_TYPE, "Standard");
    let _ = RuleEvaluator::new().evaluate(&rule, &context);
});
