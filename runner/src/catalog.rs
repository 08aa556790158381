use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer,
};
use std::{collections::BTreeMap, fmt, fs, io, path::Path};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read provider catalog")]
    ReadFailed(#[from] io::Error),
    #[error("Provider catalog is not valid YAML")]
    InvalidYaml(#[from] serde_yaml::Error),
}

/// One management system or configuration manager of the lab
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Provider {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub size: Option<String>,
    // everything else the lab describes about the provider
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Provider {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }
}

/// Provider id -> provider, in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderMap(Vec<(String, Provider)>);

impl ProviderMap {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Provider)> {
        self.0.iter().map(|(id, provider)| (id.as_str(), provider))
    }

    pub fn get(&self, id: &str) -> Option<&Provider> {
        self.iter()
            .find(|(candidate, _)| *candidate == id)
            .map(|(_, provider)| provider)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// ids of every provider matching `filter`
    pub fn select(&self, filter: impl Fn(&Provider) -> bool) -> Vec<String> {
        self.iter()
            .filter(|(_, provider)| filter(provider))
            .map(|(id, _)| id.to_owned())
            .collect()
    }
}

impl<'de> Deserialize<'de> for ProviderMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = ProviderMap;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of provider ids to providers")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));

                while let Some((id, provider)) = access.next_entry::<String, Provider>()? {
                    entries.push((id, provider));
                }

                Ok(ProviderMap(entries))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(ProviderMap::default())
            }
        }

        deserializer.deserialize_any(OrderedVisitor)
    }
}

/// The lab description scenarios are generated from
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ProviderCatalog {
    #[serde(default)]
    pub management_systems: ProviderMap,
    #[serde(default)]
    pub configuration_managers: ProviderMap,
}

impl ProviderCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let catalog = Self::from_yaml(&fs::read_to_string(path)?)?;
        debug!(
            "Loaded {} management systems and {} configuration managers from {}",
            catalog.management_systems.len(),
            catalog.configuration_managers.len(),
            path.display()
        );

        Ok(catalog)
    }

    pub fn from_yaml(source: &str) -> Result<Self, CatalogError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// look up a provider in either section
    pub fn provider(&self, id: &str) -> Option<&Provider> {
        self.management_systems
            .get(id)
            .or_else(|| self.configuration_managers.get(id))
    }

    /// display name of a provider, the id itself when unknown
    pub fn name<'a>(&'a self, id: &'a str) -> &'a str {
        self.provider(id)
            .map(|provider| provider.name.as_str())
            .unwrap_or(id)
    }
}
