//! Built-in query templates
//!
//! Used whenever the template source is missing or yields nothing usable.

use serde::{Deserialize, Serialize};

/// Tags for the templates that are always available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultQuery {
    FindProgramsByUniversity,
    FindProgramsByIelts,
    VisaInfo,
    VisaEligibility,
    SettlementInfo,
    ComprehensivePathway,
}

impl DefaultQuery {
    pub const ALL: [DefaultQuery; 6] = [
        DefaultQuery::FindProgramsByUniversity,
        DefaultQuery::FindProgramsByIelts,
        DefaultQuery::VisaInfo,
        DefaultQuery::VisaEligibility,
        DefaultQuery::SettlementInfo,
        DefaultQuery::ComprehensivePathway,
    ];

    /// Registry identifier for this query
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FindProgramsByUniversity => "find_programs_by_university",
            Self::FindProgramsByIelts => "find_programs_by_ielts",
            Self::VisaInfo => "visa_info",
            Self::VisaEligibility => "visa_eligibility",
            Self::SettlementInfo => "settlement_info",
            Self::ComprehensivePathway => "comprehensive_pathway",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.as_str() == s)
    }

    /// Cypher text of the built-in template
    pub fn body(&self) -> &'static str {
        match self {
            Self::FindProgramsByUniversity => FIND_PROGRAMS_BY_UNIVERSITY,
            Self::FindProgramsByIelts => FIND_PROGRAMS_BY_IELTS,
            Self::VisaInfo => VISA_INFO,
            Self::VisaEligibility => VISA_ELIGIBILITY,
            Self::SettlementInfo => SETTLEMENT_INFO,
            Self::ComprehensivePathway => COMPREHENSIVE_PATHWAY,
        }
    }
}

impl std::fmt::Display for DefaultQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const FIND_PROGRAMS_BY_UNIVERSITY: &str = "\
MATCH (u:University {name: $university_name})
MATCH (u)-[:HAS_PROGRAMS]->(pg:ProgramGroup)
      -[:HAS_LEVEL]->(pl:ProgramLevel {name: $level})
      -[:OFFERS]->(p:Program)
OPTIONAL MATCH (p)-[:HAS_REQUIRED]->(es:ExamScore)<-[:HAS_SCORE]-(e:Exam)
RETURN u.name AS university,
       p.name AS program_name,
       p.url AS program_url,
       p.starting_months AS starting_months,
       collect({exam: e.name, score: es.value}) AS requirements
LIMIT 10";

const FIND_PROGRAMS_BY_IELTS: &str = "\
MATCH (p:Program)-[:HAS_REQUIRED]->(es:ExamScore)
      <-[:HAS_SCORE]-(e:Exam {name: \"IELTS\"})
WHERE es.value <= $max_score
MATCH (p)<-[:OFFERS]-(pl:ProgramLevel)
      <-[:HAS_LEVEL]-(pg:ProgramGroup)
      <-[:HAS_PROGRAMS]-(u:University)
RETURN u.name AS university,
       p.name AS program_name,
       es.value AS ielts_required,
       p.url AS url
ORDER BY es.value ASC
LIMIT 10";

const VISA_INFO: &str = "\
MATCH (v:Visa {subclass: $subclass})
OPTIONAL MATCH (v)-[:HAS_ABOUT_INFO]->(a:AboutInfo)
RETURN v.name_visa AS visa_name,
       v.subclass AS subclass,
       v.url AS official_url,
       collect({field: a.field, content: a.content}) AS about_information";

const VISA_ELIGIBILITY: &str = "\
MATCH (v:Visa {subclass: $subclass})
      -[:HAS_ELIGIBILITY_GROUP]->(eg:EligibilityGroup)
      -[:HAS_REQUIREMENT]->(er:EligibilityRequirement)
RETURN v.name_visa AS visa_name,
       eg.group_key AS requirement_group,
       collect({key: er.key, content: er.content}) AS requirements
ORDER BY eg.group_key";

const SETTLEMENT_INFO: &str = "\
MATCH (cat:SettlementCategory)
WHERE toLower(cat.name) CONTAINS toLower($keyword)
MATCH (cat)-[:HAS_GROUP]->(tg:SettlementTaskGroup)
      -[:CONTAINS_SETTLEMENT_PAGE]->(sp:SettlementPage)
RETURN cat.name AS category,
       collect(DISTINCT {
           task_group: tg.name,
           page_title: sp.title,
           page_url: sp.url
       }) AS related_info
LIMIT 5";

const COMPREHENSIVE_PATHWAY: &str = "\
MATCH (p:Program)-[:FOCUSES_ON]->(subj:Subject)
WHERE toLower(subj.name) CONTAINS toLower($field)
MATCH (p)<-[:OFFERS]-(pl:ProgramLevel)<-[:HAS_LEVEL]-(pg:ProgramGroup)
      <-[:HAS_PROGRAMS]-(u:University)
OPTIONAL MATCH (p)-[:HAS_REQUIRED]->(es:ExamScore)<-[:HAS_SCORE]-(e:Exam)
WITH u, p, collect({exam: e.name, score: es.value}) AS requirements
LIMIT 3
MATCH (v:Visa {subclass: \"500\"})
MATCH (vpr:Visa)
WHERE vpr.subclass IN [\"189\", \"190\"]
RETURN {
    study: {
        university: u.name,
        program: p.name,
        requirements: requirements,
        url: p.url
    },
    student_visa: {
        name: v.name_visa,
        subclass: v.subclass
    },
    pr_visas: collect(DISTINCT {
        name: vpr.name_visa,
        subclass: vpr.subclass
    })
} AS pathway";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_identifiers() {
        for query in DefaultQuery::ALL {
            assert_eq!(DefaultQuery::parse(query.as_str()), Some(query));
        }
        assert_eq!(DefaultQuery::parse("fallback"), None);
    }

    #[test]
    fn test_visa_queries_take_subclass() {
        assert!(DefaultQuery::VisaInfo.body().contains("$subclass"));
        assert!(DefaultQuery::VisaEligibility.body().contains("$subclass"));
        assert!(DefaultQuery::FindProgramsByIelts.body().contains("$max_score"));
    }
}
