use fail::fail_point;

#[cfg(feature = "failpoints")]
use crate::bail;
#[cfg(feature = "failpoints")]
use crate::error::ErrorKind;
use crate::error::PipelineResult;

pub const SOURCE_STAGE__BEFORE_SEND: &str = "source_stage.before_send";
pub const TRANSFORM_STAGE__BEFORE_SEND: &str = "transform_stage.before_send";
pub const MERGE_FORWARDER__BEFORE_SEND: &str = "merge_forwarder.before_send";

#[cfg_attr(not(feature = "failpoints"), allow(unused_variables))]
pub fn stage_fail_point(name: &str) -> PipelineResult<()> {
    fail_point!(name, |_| {
        bail!(
            ErrorKind::Unknown,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
