use crate::catalog::{Provider, ProviderCatalog};
use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::info;

/// Provider ids exercised together in one benchmark or workload run
pub type Scenario = Vec<String>;

const BENCHMARK: &str = "benchmark";
const PROVISIONING: &str = "benchmark_provisioning";
const SMARTSTATE: &str = "benchmark_smartstate";
const CAP_AND_UTIL: &str = "benchmark_cap_and_util";
const WORKLOAD_SIZES: [&str; 2] = ["medium", "large"];

/// Every contiguous window of length 1..=n, shortest first
pub fn contiguous_windows(providers: &[String]) -> Vec<Scenario> {
    (1..=providers.len())
        .flat_map(|length| providers.windows(length).map(<[String]>::to_vec))
        .collect()
}

fn size_of(provider: &Provider) -> &str {
    provider.size.as_deref().unwrap_or_default()
}

/// group provider ids by size, sizes in descending order
fn size_groups<'a>(
    catalog: &'a ProviderCatalog,
    filter: impl Fn(&Provider) -> bool,
) -> Vec<(&'a str, Vec<String>)> {
    let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();

    for (id, provider) in catalog.management_systems.iter() {
        if filter(provider) {
            groups
                .entry(size_of(provider))
                .or_default()
                .push(id.to_owned());
        }
    }

    groups.into_iter().rev().collect()
}

pub fn provisioning_memory_scenarios(catalog: &ProviderCatalog) -> Vec<Scenario> {
    contiguous_windows(
        &catalog
            .management_systems
            .select(|provider| provider.has_tag(PROVISIONING)),
    )
}

pub fn smartstate_memory_scenarios(catalog: &ProviderCatalog) -> Vec<Scenario> {
    contiguous_windows(
        &catalog
            .management_systems
            .select(|provider| provider.has_tag(SMARTSTATE)),
    )
}

/// Each capacity and utilization provider alone, then every size group with
/// more than one member
pub fn cap_and_util_memory_scenarios(catalog: &ProviderCatalog) -> Vec<Scenario> {
    let is_cap_and_util = |provider: &Provider| provider.has_tag(CAP_AND_UTIL);

    catalog
        .management_systems
        .select(is_cap_and_util)
        .into_iter()
        .map(|id| vec![id])
        .chain(
            size_groups(catalog, is_cap_and_util)
                .into_iter()
                .filter(|(_, group)| group.len() > 1)
                .map(|(_, group)| group),
        )
        .collect()
}

/// Windows over the provisioning and smartstate providers, each paired with
/// every medium or large capacity and utilization provider and then with every
/// size group of them
pub fn all_workload_memory_scenarios(catalog: &ProviderCatalog) -> Vec<Scenario> {
    let is_cap_and_util = |provider: &Provider| {
        provider.has_tag(CAP_AND_UTIL) && WORKLOAD_SIZES.contains(&size_of(provider))
    };

    let cap_and_util = catalog.management_systems.select(is_cap_and_util);
    let pro_smart = catalog
        .management_systems
        .select(|provider| provider.has_tag(PROVISIONING) || provider.has_tag(SMARTSTATE))
        .into_iter()
        .unique()
        .collect_vec();
    let windows = contiguous_windows(&pro_smart);

    let paired = cap_and_util.iter().flat_map(|id| {
        windows.iter().map(move |window| {
            let mut scenario = window.clone();
            scenario.push(id.clone());
            scenario
        })
    });

    let grouped = size_groups(catalog, is_cap_and_util)
        .into_iter()
        .flat_map(|(_, group)| {
            windows.iter().map(move |window| {
                let mut scenario = window.clone();
                scenario.extend(group.iter().cloned());
                scenario
            })
        });

    paired.chain(grouped).collect()
}

/// tag `benchmark` without `benchmark_provisioning`
pub fn benchmark_providers(catalog: &ProviderCatalog) -> Vec<String> {
    catalog
        .management_systems
        .select(|provider| provider.has_tag(BENCHMARK) && !provider.has_tag(PROVISIONING))
}

pub fn smartstate_benchmark_providers(catalog: &ProviderCatalog) -> Vec<String> {
    catalog
        .management_systems
        .select(|provider| provider.has_tag(SMARTSTATE))
}

pub fn vmware_benchmark_providers(catalog: &ProviderCatalog) -> Vec<String> {
    catalog
        .management_systems
        .select(|provider| provider.has_tag(BENCHMARK) && provider.has_tag("vmware"))
}

pub fn rhevm_benchmark_providers(catalog: &ProviderCatalog) -> Vec<String> {
    catalog
        .management_systems
        .select(|provider| provider.has_tag(BENCHMARK) && provider.has_tag("rhevm"))
}

/// benchmark providers that do not go through the vim broker
pub fn nobroker_benchmark_providers(catalog: &ProviderCatalog) -> Vec<String> {
    catalog
        .management_systems
        .select(|provider| provider.has_tag(BENCHMARK) && !provider.has_tag("vmware"))
}

pub fn config_manager_benchmark_providers(catalog: &ProviderCatalog) -> Vec<String> {
    catalog
        .configuration_managers
        .select(|provider| provider.has_tag(BENCHMARK))
}

/// "A, B" from the display names of a scenario
pub fn providers_tested(catalog: &ProviderCatalog, scenario: &[String]) -> String {
    let tested = scenario.iter().map(|id| catalog.name(id)).join(", ");
    info!(
        "Testing with {} Provider(s): {tested}",
        scenario.len()
    );

    tested
}

/// `<n>xProviders-A-B` for multi provider scenarios, the plain name otherwise
pub fn test_name(providers_tested: &str, count: usize) -> String {
    if count > 1 {
        format!("{count}xProviders-{}", providers_tested.replace(", ", "-"))
    } else {
        providers_tested.to_owned()
    }
}
