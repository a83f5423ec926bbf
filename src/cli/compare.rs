use stager::core::version;
use stager::core::StagerResult;
use std::cmp::Ordering;

/// Print -1, 0 or 1 the way a sort comparator would
pub fn run(v1: &str, v2: &str) -> StagerResult<()> {
    let result = match version::compare(v1, v2)? {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    };
    println!("{}", result);
    Ok(())
}
