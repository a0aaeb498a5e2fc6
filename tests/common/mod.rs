//! Shared fixtures: a synthetic long-quote dataset and a config rooted in a temp dir.

#![allow(dead_code)]

use lead_conversion::Config;
use std::path::Path;

pub const HEADER: &str = "long_quote_id,lead_id,submitted_at,effective_start_date,provider,product_third_party,product_intermediate,product_all_risks,chosen_formula,chosen_product,main_driver_gender,vehicle_class,vehicle_region,main_driver_age,main_driver_licence_age,main_driver_bonus,vehicle_age,vehicle_group,annual_price_third_party,annual_price_intermediate,annual_price_all_risks,last_utm_source,rbs_result,policy_subscribed_at,contract_id,payment_frequency,has_subscribed_online,has_subscribed";

/// Quotes where young drivers with cheap prices convert. Every tenth row leaves a
/// numerical field blank so imputation is exercised.
pub fn quotes_csv(n: usize) -> String {
    let mut csv = format!("{HEADER}\n");
    for i in 0..n {
        let converts = i % 2 == 0;
        let (age, price) = if converts { ("18-25", "low") } else { ("60+", "high") };
        let bonus = if i % 10 == 9 { String::new() } else { (50 + i % 40).to_string() };
        csv.push_str(&format!(
            "{i},{lead},2023-04-{sub:02}T09:30:00+02:00,2023-05-{eff:02} 00:00:00,{provider},tp,{im},ar,{formula},car,{gender},A,{region},{age},{lic},{bonus},{va}+,{vg},{price},medium,{price},google,ok,,c{i},monthly,False,{label}\n",
            lead = 1000 + i,
            sub = 1 + i % 28,
            eff = 1 + (i * 7) % 28,
            provider = ["acme", "zeta", "omni"][i % 3],
            im = if i % 4 == 0 { "" } else { "im" },
            formula = if i % 3 == 0 { "basic" } else { "full" },
            gender = if i % 5 < 2 { "F" } else { "M" },
            region = ["north", "south", "east", "west"][i % 4],
            lic = 1 + i % 9,
            va = i % 12,
            vg = 5 + i % 15,
            label = u8::from(converts),
        ));
    }
    csv
}

pub fn write_quotes(path: &Path, n: usize) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, quotes_csv(n)).unwrap();
}

/// Config with every file location under `root` and a small forest.
pub fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.data.raw_data_path = root.join("data/long_quotes.csv");
    config.data.preprocessed_path = root.join("data/preprocessed_data.csv");
    config.data.test_features_path = root.join("data/X_test.csv");
    config.training.results_path = root.join("results/evaluation.txt");
    config.training.n_estimators = 15;
    config.server.models_dir = root.join("models");
    config
}
