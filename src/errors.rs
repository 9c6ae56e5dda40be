//! The crate-wide error type, stitched together from each module's own
//! error enum via `quick_error!`'s `from()` clauses.

use crate::{directive, discovery, pool, process, scheduler};

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Process(err: process::Error) {
            description(err.description())
            display("{}", err)
            cause(err)
            from()
        }
        Pool(err: pool::Error) {
            description(err.description())
            display("{}", err)
            cause(err)
            from()
        }
        Scheduler(err: scheduler::Error) {
            description(err.description())
            display("{}", err)
            cause(err)
            from()
        }
        Directive(err: directive::ParseError) {
            description(err.description())
            display("{}", err)
            cause(err)
            from()
        }
        Discovery(err: discovery::Error) {
            description(err.description())
            display("{}", err)
            cause(err)
            from()
        }
        NoTestsFound {
            description("no .jakt files found under the given paths")
        }
    }
}
