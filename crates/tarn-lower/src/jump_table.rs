// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Jump-table construction over a machine's resume points.

use tarn_tir::{build, Expr};

use crate::env::{LabelEnv, LabelSupply, Pc};

/// Dispatch over `pcs`: an integer switch on `dispatch` whose arms jump
/// to each PC's label, falling through to a fresh label marked just
/// ahead of `continuation`. The unset slot value 0 takes the fallthrough
/// and runs the body from the top.
///
/// With no PCs there is nothing to jump to and the continuation is
/// returned unchanged.
pub(crate) fn build(
    pcs: &[Pc],
    labels: &LabelEnv,
    dispatch: Expr,
    continuation: Expr,
    supply: &mut LabelSupply,
) -> Expr {
    if pcs.is_empty() {
        return continuation;
    }
    let initial = supply.fresh();
    let arms = pcs
        .iter()
        .map(|&pc| (i64::from(pc.0), build::goto(labels.expect_label(pc))))
        .collect();
    let switch = build::int_switch(dispatch, arms, build::goto(initial));
    build::seq(
        switch,
        build::seq(build::label_mark(initial), continuation),
    )
}
