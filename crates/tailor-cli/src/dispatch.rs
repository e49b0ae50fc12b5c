use color_eyre::{eyre::eyre, Result};
use tailor_core::{
    cleanup_command, index_show, lock_release, lock_status, publish_command, CleanupRequest,
    CommandContext, CommandGroup, CommandInfo, ExecutionOutcome, IndexShowRequest, LockRequest,
    PublishRequest,
};

use crate::cli::{CleanupArgs, CommandGroupCli, IndexCommand, LockArgs, LockCommand, PublishArgs};

pub fn command_info(group: &CommandGroupCli) -> CommandInfo {
    match group {
        CommandGroupCli::Publish(_) => CommandInfo::new(CommandGroup::Publish, "publish"),
        CommandGroupCli::Cleanup(_) => CommandInfo::new(CommandGroup::Cleanup, "cleanup"),
        CommandGroupCli::Index(IndexCommand::Show(_)) => {
            CommandInfo::new(CommandGroup::Index, "show")
        }
        CommandGroupCli::Lock(LockCommand::Status(_)) => {
            CommandInfo::new(CommandGroup::Lock, "status")
        }
        CommandGroupCli::Lock(LockCommand::Release(_)) => {
            CommandInfo::new(CommandGroup::Lock, "release")
        }
    }
}

pub fn dispatch_command(
    ctx: &CommandContext,
    group: &CommandGroupCli,
) -> Result<(CommandInfo, ExecutionOutcome)> {
    let info = command_info(group);
    let outcome = match group {
        CommandGroupCli::Publish(args) => publish_command(ctx, &publish_request_from_args(args)),
        CommandGroupCli::Cleanup(args) => cleanup_command(ctx, &cleanup_request_from_args(args)),
        CommandGroupCli::Index(IndexCommand::Show(args)) => index_show(
            ctx,
            &IndexShowRequest {
                bucket: args.bucket.clone(),
                index_key: args.index_key.clone(),
                version: args.version.clone(),
            },
        ),
        CommandGroupCli::Lock(LockCommand::Status(args)) => {
            lock_status(ctx, &lock_request_from_args(args))
        }
        CommandGroupCli::Lock(LockCommand::Release(args)) => {
            lock_release(ctx, &lock_request_from_args(args))
        }
    }
    .map_err(|err| eyre!("{err:?}"))?;
    Ok((info, outcome))
}

fn publish_request_from_args(args: &PublishArgs) -> PublishRequest {
    PublishRequest {
        bucket: args.bucket.clone(),
        index_key: args.index_key.clone(),
        timestamp: args.timestamp.clone(),
        artifact_path: args.artifact_path.clone(),
        file: args.file.clone(),
        checksum: args.checksum.clone(),
        distribution_id: args.distribution_id.clone(),
    }
}

fn cleanup_request_from_args(args: &CleanupArgs) -> CleanupRequest {
    CleanupRequest {
        bucket: args.bucket.clone(),
        release_label: args.release_label.clone(),
        organization: args.organization.clone(),
        days_to_keep: args.days_to_keep,
        num_to_keep: args.num_to_keep,
        dry_run: args.dry_run,
    }
}

fn lock_request_from_args(args: &LockArgs) -> LockRequest {
    LockRequest {
        bucket: args.bucket.clone(),
        key: args.key.clone(),
    }
}
