use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("ipcwire {}", env!("CARGO_PKG_VERSION"));
    if !args.extended {
        return Ok(SUCCESS);
    }

    println!(
        "target: {}",
        option_env!("IPCWIRE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("IPCWIRE_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!(
        "transport: AF_UNIX/SOCK_SEQPACKET, max body {} bytes, max fds {}",
        ipcwire_transport::DEFAULT_MAX_BODY,
        ipcwire_transport::DEFAULT_MAX_FDS
    );
    println!(
        "features: connection={}, cli=true",
        cfg!(feature = "connection")
    );

    Ok(SUCCESS)
}
