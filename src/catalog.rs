use crate::config::PackConfig;

/// One purchasable pack: a price in the smallest currency unit and the
/// lifetime of the key it mints (0 minutes = never expires).
#[derive(Debug, Clone)]
pub struct Pack {
    pub code: String,
    pub price: i64,
    pub minutes: i64,
    pub label: String,
}

/// The pack table, built once from config and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Catalog {
    packs: Vec<Pack>,
}

impl Catalog {
    #[must_use]
    pub fn from_config(configs: &[PackConfig]) -> Self {
        let packs = configs
            .iter()
            .map(|p| Pack {
                code: p.code.to_lowercase(),
                price: p.price,
                minutes: p.minutes,
                label: p.label.clone(),
            })
            .collect();
        Self { packs }
    }

    /// Pack codes are matched case-insensitively.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&Pack> {
        let code = code.to_lowercase();
        self.packs.iter().find(|p| p.code == code)
    }

    #[must_use]
    pub fn packs(&self) -> &[Pack] {
        &self.packs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn default_catalog_lookup() {
        let config = Config::default();
        let catalog = Catalog::from_config(&config.packs);

        let day = catalog.get("1d").expect("1d pack");
        assert_eq!(day.price, 15_000);
        assert_eq!(day.minutes, 1440);

        let life = catalog.get("life").expect("life pack");
        assert_eq!(life.price, 150_000);
        assert_eq!(life.minutes, 0);

        assert!(catalog.get("7d").is_none());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let config = Config::default();
        let catalog = Catalog::from_config(&config.packs);
        assert!(catalog.get("LIFE").is_some());
        assert!(catalog.get("Life").is_some());
    }
}
