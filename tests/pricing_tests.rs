#![cfg(feature = "pricing")]

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use vatcost::core::*;
use vatcost::pricing::*;
use vatcost::rules::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn eur(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount, "EUR").unwrap()
}

fn vat_rule(country: &str, id: &str, expression: &str) -> Rule {
    RuleBuilder::new(country, RuleType::VatRate, id, expression, date(2024, 1, 1))
        .id(id)
        .priority(1)
        .build()
        .unwrap()
}

fn scenario_rules() -> InMemoryRuleRepository {
    InMemoryRuleRepository::new()
        .with_rule(vat_rule("GB", "GB-VAT", "basePrice * 1.5"))
        .with_rule(vat_rule("DE", "DE-VAT", "basePrice * 1.25"))
}

fn volume_discount() -> EngineConfig {
    EngineConfig::default().with_discount_policy(DiscountPolicy::new(
        "Volume Discount",
        dec!(10),
        DiscountCriterion::MinCountries(2),
    ))
}

fn request(countries: &[&str]) -> CalculationRequestBuilder {
    CalculationRequest::builder(ServiceType::Standard, 250, FilingFrequency::Quarterly)
        .user("user-42")
        .countries(countries.iter().copied())
        .calculation_date(date(2024, 6, 1))
}

// ── Scenarios ───────────────────────────────────────────────────────────────

#[test]
fn scenario_a_single_country_vat_rule() {
    let rules = InMemoryRuleRepository::new().with_rule(vat_rule("GB", "GB-VAT", "basePrice * 0.20"));
    let engine = PricingEngine::new(rules, InMemoryCountryRepository::european());
    let model = engine
        .calculate(&request(&["GB"]).currency("GBP").build().unwrap())
        .unwrap();

    assert_eq!(model.currency_code, "GBP");
    let gb = model.breakdown("GB").unwrap();
    assert_eq!(gb.total_cost, dec!(200));
    assert_eq!(gb.base_cost, dec!(200));
    assert_eq!(gb.additional_cost, dec!(0));
    assert_eq!(gb.applied_rules, vec!["GB-VAT"]);
    assert!(model.discounts.is_empty());
    assert_eq!(model.total_cost, dec!(200));
}

#[test]
fn scenario_b_aggregate_with_volume_discount() {
    let mut calc = Calculation::new(
        "user-42",
        "standard",
        250,
        FilingFrequency::Quarterly,
        "EUR",
        date(2024, 6, 1),
    )
    .unwrap();
    calc.add_country("GB", eur(dec!(1500))).unwrap();
    calc.add_country("DE", eur(dec!(1250))).unwrap();
    let applied = calc.add_discount("Volume Discount", dec!(10)).unwrap();

    assert_eq!(applied.discount_amount, eur(dec!(275)));
    assert_eq!(calc.total_cost(), &eur(dec!(2475)));
    assert_eq!(calc.recalculate_total_cost().unwrap(), eur(dec!(2475)));
    calc.finalize().unwrap();
}

#[test]
fn scenario_b_through_the_engine() {
    let engine =
        PricingEngine::with_config(scenario_rules(), InMemoryCountryRepository::european(), volume_discount());
    let model = engine
        .calculate(&request(&["GB", "DE"]).currency("EUR").build().unwrap())
        .unwrap();

    assert_eq!(model.breakdown("GB").unwrap().total_cost, dec!(1500));
    assert_eq!(model.breakdown("DE").unwrap().total_cost, dec!(1250));
    assert_eq!(model.subtotal, dec!(2750));
    assert_eq!(model.discounts["Volume Discount"], dec!(10));
    assert_eq!(model.discount_lines[0].name, "Volume Discount");
    assert_eq!(model.discount_lines[0].amount, dec!(275));
    assert_eq!(model.total_cost, dec!(2475));
}

#[test]
fn scenario_c_unknown_country_does_not_block_others() {
    let engine = PricingEngine::new(scenario_rules(), InMemoryCountryRepository::european());
    let model = engine
        .calculate(&request(&["GB", "ZZ", "DE"]).currency("EUR").build().unwrap())
        .unwrap();

    let priced: Vec<_> = model
        .country_breakdowns
        .iter()
        .map(|b| b.country_code.as_str())
        .collect();
    assert_eq!(priced, vec!["GB", "DE"]);
    assert!(model.is_partial());
    assert_eq!(
        model.diagnostics,
        vec![CalculationError::UnknownCountry("ZZ".into())]
    );
    assert_eq!(model.total_cost, dec!(2750));
}

#[test]
fn scenario_d_duplicate_country_is_rejected() {
    let mut calc = Calculation::new(
        "user-42",
        "standard",
        250,
        FilingFrequency::Quarterly,
        "EUR",
        date(2024, 6, 1),
    )
    .unwrap();
    calc.add_country("GB", eur(dec!(1500))).unwrap();

    let err = calc.add_country("GB", eur(dec!(99))).unwrap_err();
    assert!(matches!(err, CalculationError::InvalidOperation(_)));
    assert_eq!(calc.total_cost(), &eur(dec!(1500)));
}

// ── Engine behaviour ────────────────────────────────────────────────────────

#[test]
fn rules_compound_in_priority_order() {
    let from = date(2024, 1, 1);
    let rules = InMemoryRuleRepository::new()
        .with_rule(
            RuleBuilder::new(
                "GB",
                RuleType::Threshold,
                "High volume surcharge",
                "transactionVolume > 100 ? basePrice * 0.5 : 0",
                from,
            )
            .id("GB-THRESHOLD")
            .priority(2)
            .build()
            .unwrap(),
        )
        .with_rule(vat_rule("GB", "GB-VAT", "basePrice * 0.20"));
    let engine = PricingEngine::new(rules, InMemoryCountryRepository::european());

    let high = engine
        .calculate(&request(&["GB"]).build().unwrap())
        .unwrap();
    let gb = high.breakdown("GB").unwrap();
    assert_eq!(gb.applied_rules, vec!["GB-VAT", "GB-THRESHOLD"]);
    assert_eq!(gb.total_cost, dec!(300));

    let low = engine
        .calculate(
            &CalculationRequest::builder(ServiceType::Standard, 50, FilingFrequency::Quarterly)
                .country("GB")
                .calculation_date(date(2024, 6, 1))
                .build()
                .unwrap(),
        )
        .unwrap();
    assert_eq!(low.breakdown("GB").unwrap().applied_rules, vec!["GB-VAT"]);
    assert_eq!(low.total_cost, dec!(200));
}

#[test]
fn service_tier_sets_base_price() {
    let engine = PricingEngine::new(scenario_rules(), InMemoryCountryRepository::european());
    let model = engine
        .calculate(
            &CalculationRequest::builder(ServiceType::Priority, 10, FilingFrequency::Monthly)
                .country("GB")
                .calculation_date(date(2024, 6, 1))
                .build()
                .unwrap(),
        )
        .unwrap();
    assert_eq!(model.service_id, "priority");
    assert_eq!(model.total_cost, dec!(3000));
}

#[test]
fn rule_parameters_come_from_the_request() {
    let rule = RuleBuilder::new(
        "DE",
        RuleType::Complexity,
        "Per entity fee",
        "entities * fee",
        date(2024, 1, 1),
    )
    .id("DE-ENTITIES")
    .parameter(RuleParameter::new("entities", ParameterType::Integer, "1").unwrap())
    .parameter(RuleParameter::new("fee", ParameterType::Decimal, "75").unwrap())
    .build()
    .unwrap();
    let engine = PricingEngine::new(
        InMemoryRuleRepository::new().with_rule(rule),
        InMemoryCountryRepository::european(),
    );

    let defaulted = engine.calculate(&request(&["DE"]).build().unwrap()).unwrap();
    assert_eq!(defaulted.total_cost, dec!(75));

    let supplied = engine
        .calculate(&request(&["DE"]).parameter("entities", "3").build().unwrap())
        .unwrap();
    assert_eq!(supplied.total_cost, dec!(225));
    assert_eq!(supplied.breakdown("DE").unwrap().additional_cost, dec!(225));
}

#[test]
fn broken_rule_is_reported_not_fatal() {
    let rules = scenario_rules().with_rule(
        RuleBuilder::new("GB", RuleType::Complexity, "Broken", "basePrice * (", date(2024, 1, 1))
            .id("GB-BROKEN")
            .build()
            .unwrap(),
    );
    let engine = PricingEngine::new(rules, InMemoryCountryRepository::european());
    let model = engine
        .calculate(&request(&["GB"]).currency("EUR").build().unwrap())
        .unwrap();

    assert_eq!(model.total_cost, dec!(1500));
    assert!(matches!(
        &model.diagnostics[..],
        [CalculationError::RuleEvaluation { rule_id, .. }] if rule_id == "GB-BROKEN"
    ));
}

#[test]
fn expired_rules_are_ignored() {
    let rules = InMemoryRuleRepository::new()
        .with_rule(
            RuleBuilder::new("GB", RuleType::VatRate, "Old", "basePrice", date(2020, 1, 1))
                .id("GB-OLD")
                .effective_to(date(2023, 12, 31))
                .build()
                .unwrap(),
        )
        .with_rule(vat_rule("GB", "GB-VAT", "basePrice * 0.20"));
    let engine = PricingEngine::new(rules, InMemoryCountryRepository::european());
    let model = engine.calculate(&request(&["GB"]).build().unwrap()).unwrap();
    assert_eq!(model.breakdown("GB").unwrap().applied_rules, vec!["GB-VAT"]);
}

struct FailingCountries;

impl CountryRepository for FailingCountries {
    fn get_by_code(&self, _code: &str) -> Result<Option<Country>, CalculationError> {
        Err(CalculationError::Repository("country store offline".into()))
    }
}

#[test]
fn repository_failure_aborts() {
    let engine = PricingEngine::new(scenario_rules(), FailingCountries);
    let err = engine
        .calculate(&request(&["GB"]).currency("EUR").build().unwrap())
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err, CalculationError::Repository("country store offline".into()));
}

#[test]
fn aggregate_satisfies_sum_invariant() {
    let engine =
        PricingEngine::with_config(scenario_rules(), InMemoryCountryRepository::european(), volume_discount());
    let (calc, model) = engine
        .calculate_with_aggregate(&request(&["GB", "DE"]).currency("EUR").build().unwrap())
        .unwrap();

    assert_eq!(calc.status(), CalculationStatus::Finalized);
    assert_eq!(calc.calculation_id(), model.calculation_id);
    assert_eq!(calc.recalculate_total_cost().unwrap(), *calc.total_cost());
    assert_eq!(calc.subtotal().unwrap(), eur(dec!(2750)));
    assert_eq!(calc.discount("Volume Discount"), Some(dec!(10)));
}

#[test]
fn rounded_breakdown_adds_up() {
    let from = date(2024, 1, 1);
    let rules = InMemoryRuleRepository::new()
        .with_rule(vat_rule("GB", "GB-VAT", "0.005"))
        .with_rule(
            RuleBuilder::new("GB", RuleType::Complexity, "GB effort", "0.005", from)
                .id("GB-FREQ")
                .priority(2)
                .build()
                .unwrap(),
        )
        .with_rule(vat_rule("DE", "DE-VAT", "0.125"));
    let engine =
        PricingEngine::with_config(rules, InMemoryCountryRepository::european(), volume_discount());
    let model = engine
        .calculate(&request(&["GB", "DE"]).currency("EUR").build().unwrap())
        .unwrap();

    let gb = model.breakdown("GB").unwrap();
    assert_eq!(gb.base_cost + gb.additional_cost, gb.total_cost);
    assert_eq!(gb.total_cost, dec!(0.01));
    let de = model.breakdown("DE").unwrap();
    assert_eq!(de.total_cost, dec!(0.13));
    assert_eq!(model.subtotal, gb.total_cost + de.total_cost);

    let discounted: rust_decimal::Decimal = model.discount_lines.iter().map(|d| d.amount).sum();
    assert_eq!(discounted, dec!(0.01));
    assert_eq!(model.subtotal - discounted, model.total_cost);
    assert_eq!(model.total_cost, dec!(0.13));
}

// ── Decimal range ───────────────────────────────────────────────────────────

#[test]
fn rule_effect_past_decimal_max_is_skipped() {
    let max = rust_decimal::Decimal::MAX;
    let rules = InMemoryRuleRepository::new()
        .with_rule(vat_rule("GB", "GB-MAX", &max.to_string()))
        .with_rule(
            RuleBuilder::new("GB", RuleType::Complexity, "one more", "1", date(2024, 1, 1))
                .id("GB-ONE")
                .priority(2)
                .build()
                .unwrap(),
        );
    let engine = PricingEngine::new(rules, InMemoryCountryRepository::european());
    let model = engine
        .calculate(&request(&["GB"]).currency("GBP").build().unwrap())
        .unwrap();

    assert_eq!(model.total_cost, max);
    assert_eq!(model.breakdown("GB").unwrap().applied_rules, vec!["GB-MAX"]);
    assert!(matches!(
        &model.diagnostics[..],
        [CalculationError::RuleEvaluation { rule_id, .. }] if rule_id == "GB-ONE"
    ));
}

#[test]
fn country_pushing_total_past_decimal_max_is_reported() {
    let max = rust_decimal::Decimal::MAX.to_string();
    let rules = InMemoryRuleRepository::new()
        .with_rule(vat_rule("GB", "GB-MAX", &max))
        .with_rule(vat_rule("DE", "DE-MAX", &max));
    let req = request(&["GB", "DE"]).currency("EUR").build().unwrap();

    let model = PricingEngine::new(rules.clone(), InMemoryCountryRepository::european())
        .calculate(&req)
        .unwrap();
    assert_eq!(model.country_breakdowns.len(), 1);
    assert_eq!(model.country_breakdowns[0].country_code, "GB");
    assert!(matches!(&model.diagnostics[..], [CalculationError::Overflow(_)]));

    let strict = EngineConfig {
        fail_on_unknown_country: true,
        ..EngineConfig::default()
    };
    let err = PricingEngine::with_config(rules, InMemoryCountryRepository::european(), strict)
        .calculate(&req)
        .unwrap_err();
    assert!(matches!(err, CalculationError::Overflow(_)));
}

#[test]
fn model_serializes_camel_case_with_string_decimals() {
    let engine = PricingEngine::new(scenario_rules(), InMemoryCountryRepository::european());
    let model = engine
        .calculate(&request(&["GB"]).currency("EUR").build().unwrap())
        .unwrap();
    let json = serde_json::to_value(&model).unwrap();

    assert_eq!(json["totalCost"], "1500.00");
    assert_eq!(json["currencyCode"], "EUR");
    assert_eq!(json["countryBreakdowns"][0]["countryName"], "United Kingdom");
    assert_eq!(json["calculationDate"], "2024-06-01");

    let back: CalculationModel = serde_json::from_value(json).unwrap();
    assert_eq!(back, model);
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_pricing_matches_sequential() {
    let codes = ["GB", "DE", "FR", "ZZ", "IT", "ES", "NL"];
    let from = date(2024, 1, 1);
    let mut rules = scenario_rules();
    for code in ["FR", "IT", "ES", "NL"] {
        rules.insert(
            RuleBuilder::new(code, RuleType::VatRate, code, "basePrice * 0.21", from)
                .id(format!("{code}-VAT"))
                .build()
                .unwrap(),
        );
    }
    let sequential = PricingEngine::with_config(
        rules.clone(),
        InMemoryCountryRepository::european(),
        volume_discount(),
    );
    let parallel = PricingEngine::with_config(
        rules,
        InMemoryCountryRepository::european(),
        EngineConfig {
            parallel: true,
            ..volume_discount()
        },
    );
    let req = request(&codes).currency("EUR").build().unwrap();
    let a = sequential.calculate(&req).unwrap();
    let b = parallel.calculate(&req).unwrap();

    assert_eq!(a.total_cost, b.total_cost);
    assert_eq!(a.country_breakdowns, b.country_breakdowns);
    assert_eq!(a.diagnostics, b.diagnostics);
}

// ── Snapshot ────────────────────────────────────────────────────────────────

#[test]
fn calculation_summary_snapshot() {
    let from = date(2024, 1, 1);
    let rules = scenario_rules()
        .with_rule(
            RuleBuilder::new("GB", RuleType::Complexity, "Filing effort", "filingsPerYear * 25", from)
                .id("GB-FREQ")
                .priority(5)
                .build()
                .unwrap(),
        )
        .with_rule(
            RuleBuilder::new("DE", RuleType::SpecialRequirement, "Fiscal representative", "200", from)
                .id("DE-FISCAL")
                .priority(10)
                .condition(
                    RuleCondition::new(
                        "additionalServices",
                        ConditionOperator::Contains,
                        "fiscal-representation",
                    )
                    .unwrap(),
                )
                .build()
                .unwrap(),
        );
    let engine =
        PricingEngine::with_config(rules, InMemoryCountryRepository::european(), volume_discount());
    let model = engine
        .calculate(
            &request(&["GB", "DE", "ZZ"])
                .currency("EUR")
                .additional_service("fiscal-representation")
                .build()
                .unwrap(),
        )
        .unwrap();

    insta::assert_snapshot!("calculation_summary", model.to_string());
}
