use super::{Bond, Bonds, Maturity, Parser, ProposalInfo, ProposalStatus, Unbond};
use crate::Error;
use std::collections::BTreeMap;

const EPOCH_PREFIX: &str = "Last committed epoch:";
const KEY_ALIAS_PREFIX: &str = "with alias:";
const SCHEDULE_INFIX: &str = "withdrawable starting from epoch";

/// Decodes the human-readable console output of the node client.
#[derive(Clone, Copy, Debug, Default)]
pub struct Console;

fn invalid(what: &'static str, reason: impl Into<String>) -> Error {
    Error::Parse {
        what,
        reason: reason.into(),
    }
}

/// Integer part of a number embedded in punctuation (`"3:"`, `"4):"`, `"100.000000"`).
fn number(what: &'static str, token: &str) -> Result<u64, Error> {
    let digits = token.trim_matches(|c: char| !c.is_ascii_digit());
    let integer = digits.split_once('.').map_or(digits, |(integer, _)| integer);
    integer
        .parse()
        .map_err(|_| invalid(what, format!("not a number: {token:?}")))
}

fn field<'a>(what: &'static str, tokens: &[&'a str], index: usize) -> Result<&'a str, Error> {
    tokens
        .get(index)
        .map(|token| token.trim_end_matches(':'))
        .ok_or_else(|| invalid(what, format!("missing field {index} in {:?}", tokens.join(" "))))
}

fn last_epoch(output: &str) -> Option<&str> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix(EPOCH_PREFIX)
            .map(|epoch| epoch.trim())
    })
}

#[derive(Default)]
struct PartialProposal {
    id: u64,
    author: Option<String>,
    start_epoch: Option<u64>,
    end_epoch: Option<u64>,
    status: Option<ProposalStatus>,
}

impl PartialProposal {
    fn finish(self) -> Result<ProposalInfo, Error> {
        let id = self.id;
        let missing = move |name: &str| invalid("proposals", format!("proposal {id} has no {name}"));
        Ok(ProposalInfo {
            id,
            author: self.author.ok_or_else(|| missing("author"))?,
            start_epoch: self.start_epoch.ok_or_else(|| missing("start epoch"))?,
            end_epoch: self.end_epoch.ok_or_else(|| missing("end epoch"))?,
            status: self.status.ok_or_else(|| missing("status"))?,
        })
    }
}

impl Parser for Console {
    fn wallet_addresses(&self, output: &str) -> Result<Vec<(String, String)>, Error> {
        let mut addresses = Vec::new();
        for line in output.lines() {
            let Some(rest) = line.trim().strip_prefix('"') else {
                continue;
            };
            let Some((alias, rest)) = rest.split_once('"') else {
                return Err(invalid("wallet addresses", format!("unterminated alias: {line:?}")));
            };
            let address = rest.rsplit(':').next().map(str::trim).unwrap_or_default();
            if address.is_empty() {
                return Err(invalid("wallet addresses", format!("no address: {line:?}")));
            }
            addresses.push((alias.to_string(), address.to_string()));
        }
        Ok(addresses)
    }

    fn generated_key(&self, output: &str) -> Result<String, Error> {
        output
            .lines()
            .find_map(|line| line.split_once(KEY_ALIAS_PREFIX))
            .map(|(_, alias)| alias.trim().trim_matches('"').to_string())
            .filter(|alias| !alias.is_empty())
            .ok_or_else(|| invalid("generated key", "no alias reported"))
    }

    fn initialized_account(&self, output: &str) -> Result<(String, String), Error> {
        let line = output
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("The address"))
            .ok_or_else(|| invalid("initialized account", "no address reported"))?;
        let tokens: Vec<_> = line.split_whitespace().collect();
        let address = field("initialized account", &tokens, 2)?;
        let alias = tokens
            .last()
            .map(|alias| alias.trim_end_matches('.').trim_matches('"'))
            .unwrap_or_default();
        Ok((alias.to_string(), address.to_string()))
    }

    fn epoch(&self, output: &str) -> Result<u64, Error> {
        let epoch = last_epoch(output).ok_or_else(|| invalid("epoch", "no epoch reported"))?;
        number("epoch", epoch)
    }

    fn validators(&self, output: &str) -> Result<Vec<String>, Error> {
        let mut validators = Vec::new();
        for line in output.lines() {
            if !line.starts_with(char::is_whitespace) {
                continue;
            }
            let Some((address, power)) = line.trim().split_once(':') else {
                continue;
            };
            number("validators", power)?;
            validators.push(address.trim().to_string());
        }
        Ok(validators)
    }

    fn balances(&self, output: &str) -> Result<BTreeMap<String, u64>, Error> {
        let mut balances = BTreeMap::new();
        let mut token = None;
        for line in output.lines().map(str::trim) {
            if line.is_empty() || line.starts_with("No balances owned") {
                continue;
            }
            if let Some(symbol) = line.strip_prefix("Token ") {
                token = Some(symbol.trim().trim_end_matches(':').to_string());
                continue;
            }
            let Some((_, amount)) = line.rsplit_once(':') else {
                continue;
            };
            let Some(token) = &token else {
                return Err(invalid("balances", format!("amount outside token: {line:?}")));
            };
            balances.insert(token.clone(), number("balances", amount)?);
        }
        Ok(balances)
    }

    fn bonds(&self, output: &str) -> Result<Bonds, Error> {
        const WHAT: &str = "bonds";
        let mut bonds = Bonds::default();
        let mut pair: Option<(String, String)> = None;
        for line in output.lines().map(str::trim) {
            let tokens: Vec<_> = line.split_whitespace().collect();
            if line.starts_with("Delegations from") {
                pair = Some((
                    field(WHAT, &tokens, 2)?.to_string(),
                    field(WHAT, &tokens, 4)?.to_string(),
                ));
            } else if line.starts_with("Unbonded delegations from") {
                pair = Some((
                    field(WHAT, &tokens, 3)?.to_string(),
                    field(WHAT, &tokens, 5)?.to_string(),
                ));
            } else if line.starts_with("Self-bonds") || line.starts_with("Unbonded self-bonds") {
                pair = None;
            } else if let Some((delegator, validator)) = &pair {
                if line.starts_with("Active from epoch") {
                    bonds.delegations.push(Bond {
                        delegator: delegator.clone(),
                        validator: validator.clone(),
                        epoch: number(WHAT, field(WHAT, &tokens, 3)?)?,
                        amount: number(WHAT, field(WHAT, &tokens, tokens.len() - 1)?)?,
                    });
                } else if line.starts_with("Withdrawable from epoch") {
                    bonds.withdrawals.push(Unbond {
                        delegator: delegator.clone(),
                        validator: validator.clone(),
                        withdrawable_epoch: number(WHAT, field(WHAT, &tokens, 3)?)?,
                        active_epoch: number(WHAT, field(WHAT, &tokens, 6)?)?,
                        amount: number(WHAT, field(WHAT, &tokens, tokens.len() - 1)?)?,
                    });
                }
            }
        }
        Ok(bonds)
    }

    fn proposals(&self, output: &str) -> Result<Vec<ProposalInfo>, Error> {
        const WHAT: &str = "proposals";
        let mut proposals = Vec::new();
        let mut current: Option<PartialProposal> = None;
        for line in output.lines() {
            let Some((key, value)) = line.trim().split_once(':') else {
                continue;
            };
            let value = value.trim();
            if key == "Proposal Id" {
                if let Some(done) = current.take() {
                    proposals.push(done.finish()?);
                }
                current = Some(PartialProposal {
                    id: number(WHAT, value)?,
                    ..Default::default()
                });
                continue;
            }
            let Some(proposal) = current.as_mut() else {
                continue;
            };
            match key {
                "Author" => proposal.author = Some(value.to_string()),
                "Start Epoch" => proposal.start_epoch = Some(number(WHAT, value)?),
                "End Epoch" => proposal.end_epoch = Some(number(WHAT, value)?),
                "Status" => proposal.status = Some(ProposalStatus::parse(value)),
                _ => {}
            }
        }
        if let Some(done) = current {
            proposals.push(done.finish()?);
        }
        Ok(proposals)
    }

    fn execution_epoch(&self, output: &str) -> Option<u64> {
        number("execution epoch", last_epoch(output)?).ok()
    }

    fn withdrawal_schedule(&self, output: &str) -> Vec<Maturity> {
        output
            .lines()
            .filter(|line| line.contains(SCHEDULE_INFIX))
            .filter_map(|line| {
                let tokens: Vec<_> = line.split_whitespace().collect();
                let amount = number("withdrawal schedule", tokens.get(1)?).ok()?;
                let epoch = number("withdrawal schedule", tokens.last()?).ok()?;
                Some(Maturity { amount, epoch })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_addresses() {
        let output = "Known transparent addresses:\n  \
            \"load-tester-abc-def-ghi-jkl-1\": Established: atest1qa\n  \
            \"faucet\": Established: atest1qf\n";
        let addresses = Console.wallet_addresses(output).unwrap();
        assert_eq!(
            addresses,
            vec![
                ("load-tester-abc-def-ghi-jkl-1".into(), "atest1qa".into()),
                ("faucet".into(), "atest1qf".into()),
            ]
        );
        assert!(Console.wallet_addresses("").unwrap().is_empty());
    }

    #[test]
    fn test_key_and_account() {
        let output = "Generating key...\n\
            Successfully added a key and an address with alias: \"abc-def-ghi-jkl-1\"\n";
        assert_eq!(Console.generated_key(output).unwrap(), "abc-def-ghi-jkl-1");
        assert!(Console.generated_key("nothing").is_err());

        let output = "Transaction is valid.\n\
            The address atest1qa has been added to the wallet with alias \"load-tester-abc\".\n";
        assert_eq!(
            Console.initialized_account(output).unwrap(),
            ("load-tester-abc".to_string(), "atest1qa".to_string())
        );
    }

    #[test]
    fn test_epoch() {
        assert_eq!(Console.epoch("Last committed epoch: 17\n").unwrap(), 17);
        assert!(matches!(
            Console.epoch("Error: connection refused"),
            Err(Error::Parse { what: "epoch", .. })
        ));

        let tx = "Transaction is valid.\nLast committed epoch: 9\n";
        assert_eq!(Console.execution_epoch(tx), Some(9));
        assert_eq!(Console.execution_epoch("Transaction is valid."), None);
    }

    #[test]
    fn test_validators() {
        let output = "Consensus validators:\n  atest1v1: 1000\n  atest1v2: 2000.5\n\
            Total voting power: 3000\n";
        assert_eq!(Console.validators(output).unwrap(), vec!["atest1v1", "atest1v2"]);
        assert!(Console.validators("Consensus validators:\n  atest1v1: lots\n").is_err());
    }

    #[test]
    fn test_balances() {
        let output = "Token XAN:\n  load-tester-a: 1000.000000\nToken BTC:\n  load-tester-a: 20\n";
        let balances = Console.balances(output).unwrap();
        assert_eq!(balances.get("XAN"), Some(&1000));
        assert_eq!(balances.get("BTC"), Some(&20));
        assert_eq!(balances.get("ETH"), None);

        assert!(Console
            .balances("No balances owned by load-tester-a\n")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_bonds() {
        let output = "Delegations from atest1a to atest1v:\n  \
            Active from epoch 3: Δ 100\n  \
            Active from epoch 5: Δ 20.000000\n\
            Unbonded delegations from atest1a to atest1v:\n  \
            Withdrawable from epoch 10 (active from 4): Δ 50\n\
            Self-bonds from atest1v:\n  \
            Active from epoch 0: Δ 1000\n\
            Bonds total: 1170\n";
        let bonds = Console.bonds(output).unwrap();
        assert_eq!(
            bonds.delegations,
            vec![
                Bond {
                    delegator: "atest1a".into(),
                    validator: "atest1v".into(),
                    epoch: 3,
                    amount: 100,
                },
                Bond {
                    delegator: "atest1a".into(),
                    validator: "atest1v".into(),
                    epoch: 5,
                    amount: 20,
                },
            ]
        );
        assert_eq!(
            bonds.withdrawals,
            vec![Unbond {
                delegator: "atest1a".into(),
                validator: "atest1v".into(),
                withdrawable_epoch: 10,
                active_epoch: 4,
                amount: 50,
            }]
        );
    }

    #[test]
    fn test_proposals() {
        let output = "Proposal Id: 0\n  Author: atest1a\n  Start Epoch: 3\n  End Epoch: 6\n  \
            Status: ended\n\
            Proposal Id: 1\n  Author: atest1b\n  Start Epoch: 12\n  End Epoch: 18\n  \
            Status: pending\n";
        let proposals = Console.proposals(output).unwrap();
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[0].status, ProposalStatus::Ended);
        assert!(!proposals[0].status.is_open());
        assert_eq!(
            proposals[1],
            ProposalInfo {
                id: 1,
                author: "atest1b".into(),
                start_epoch: 12,
                end_epoch: 18,
                status: ProposalStatus::Pending,
            }
        );

        assert!(Console.proposals("Proposal Id: 0\n  Author: atest1a\n").is_err());
        assert!(Console.proposals("No proposals found.\n").unwrap().is_empty());
    }

    #[test]
    fn test_withdrawal_schedule() {
        let output = "Transaction is valid.\n\
            Amount 50 withdrawable starting from epoch 10.\n\
            Amount 25.000000 withdrawable starting from epoch 11.\n";
        assert_eq!(
            Console.withdrawal_schedule(output),
            vec![
                Maturity {
                    amount: 50,
                    epoch: 10
                },
                Maturity {
                    amount: 25,
                    epoch: 11
                },
            ]
        );
        assert!(Console.withdrawal_schedule("Transaction is valid.").is_empty());
    }
}
