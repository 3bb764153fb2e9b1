use serde_json::json;
use workdesk_agent::intent::{Intensity, UseCase};
use workdesk_agent::{recommend_bundles, BundleRequirements};

use crate::commands::CommandResult;

#[derive(Clone, Debug, Default)]
pub struct RecommendArgs {
    pub gpu: bool,
    pub ml: bool,
    pub intensity: Option<Intensity>,
    pub use_case: Option<UseCase>,
}

pub fn run(args: RecommendArgs) -> CommandResult {
    let requirements = BundleRequirements {
        gpu: args.gpu,
        ml: args.ml,
        intensity: args.intensity,
        use_case: args.use_case,
    };
    let bundles = recommend_bundles(&requirements);
    let names = bundles.iter().map(|bundle| bundle.as_str()).collect::<Vec<_>>();

    CommandResult::success_with_data(
        "recommend",
        format!("recommended: {}", names.join(", ")),
        &json!({ "recommendations": names, "requirements": requirements }),
    )
}
